// Path handling for the unified namespace

/// Make `path` absolute against `cwd` and fold `.`, `..` and repeated slashes.
///
/// The result always starts with `/` and has no trailing slash unless it is
/// the root. `..` never climbs above the root.
pub fn normalize_path(cwd: &str, path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let joined;
    let full = if path.starts_with('/') {
        path
    } else {
        joined = format!("{}/{}", cwd, path);
        &joined
    };

    for component in full.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::with_capacity(full.len());
        for part in parts {
            out.push('/');
            out.push_str(part);
        }
        out
    }
}

/// True when `path` is already in the form `normalize_path` produces
pub fn is_normalized(path: &str) -> bool {
    path.starts_with('/') && normalize_path("/", path) == path
}

/// The part of `path` below `mount_point`, if the mount covers it.
///
/// A mount covers a path when the mount point equals it or is followed by `/`
/// in it, so `/mnt` covers `/mnt/x` but not `/mntx`.
pub fn strip_mount<'a>(mount_point: &str, path: &'a str) -> Option<&'a str> {
    if mount_point == "/" {
        return path.strip_prefix('/');
    }
    let rest = path.strip_prefix(mount_point)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Pick the mount with the longest point covering `path`.
///
/// Returns the mount's position in `points` and the path relative to it.
pub fn resolve_mount<'a, 'p, I>(points: I, path: &'p str) -> Option<(usize, &'p str)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, usize, &'p str)> = None;
    for (index, point) in points.into_iter().enumerate() {
        if let Some(rel) = strip_mount(point, path) {
            if best.map_or(true, |(len, _, _)| point.len() > len) {
                best = Some((point.len(), index, rel));
            }
        }
    }
    best.map(|(_, index, rel)| (index, rel))
}

/// Name of `child` inside `parent` when `child` sits exactly one level below it
pub fn direct_child_name<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    let rest = strip_mount(parent, child)?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_and_dots() {
        assert_eq!(normalize_path("/a/b", "../c"), "/a/c");
        assert_eq!(normalize_path("/a/b", "./d"), "/a/b/d");
        assert_eq!(normalize_path("/a/b", "//x//y/"), "/x/y");
        assert_eq!(normalize_path("/", "../../.."), "/");
        assert_eq!(normalize_path("/a", ""), "/a");
        assert_eq!(normalize_path("/a", "/"), "/");
    }

    #[test]
    fn test_is_normalized() {
        assert!(is_normalized("/"));
        assert!(is_normalized("/mnt/data"));
        assert!(!is_normalized("/mnt/"));
        assert!(!is_normalized("mnt"));
        assert!(!is_normalized("/mnt/../x"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let points = ["/", "/mnt", "/mnt/data"];
        let pick = |path| resolve_mount(points.iter().copied(), path);

        assert_eq!(pick("/mnt/data/x"), Some((2, "x")));
        assert_eq!(pick("/mnt/x"), Some((1, "x")));
        assert_eq!(pick("/other"), Some((0, "other")));
        assert_eq!(pick("/mnt"), Some((1, "")));
        assert_eq!(pick("/mntx"), Some((0, "mntx")));
        assert_eq!(pick("/"), Some((0, "")));
    }

    #[test]
    fn test_no_root_mount_can_fail() {
        let points = ["/mnt"];
        assert_eq!(resolve_mount(points.iter().copied(), "/other"), None);
    }

    #[test]
    fn test_direct_children() {
        assert_eq!(direct_child_name("/", "/mnt"), Some("mnt"));
        assert_eq!(direct_child_name("/", "/mnt/data"), None);
        assert_eq!(direct_child_name("/mnt", "/mnt/data"), Some("data"));
        assert_eq!(direct_child_name("/mnt", "/mntdata"), None);
        assert_eq!(direct_child_name("/", "/"), None);
    }
}
