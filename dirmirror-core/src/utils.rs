/// Remote root with exactly one trailing `/`.
pub fn remote_dir(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() && root.starts_with('/') {
        return "/".to_string();
    }
    format!("{trimmed}/")
}

/// Remote path of a file named `name` inside remote directory `dir`.
pub fn remote_file(dir: &str, name: &str) -> String {
    format!("{dir}{name}")
}

/// Remote path of a subdirectory, always ending in `/`.
pub fn remote_subdir(dir: &str, name: &str) -> String {
    format!("{dir}{name}/")
}
