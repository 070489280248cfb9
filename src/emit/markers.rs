use std::path::Path;

/// Opens the generated region of an artifact
pub const BEGIN_MARKER: &str = "@kubeform:generated:begin";
/// Closes the generated region of an artifact
pub const END_MARKER: &str = "@kubeform:generated:end";

/// Line-comment leader for the artifact's language (`#` for YAML)
pub fn comment_leader(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => "#",
        _ => "//",
    }
}

/// Wrap generated `content` in begin/end markers.
///
/// The content is normalized to end with exactly one newline so repeated
/// runs produce identical bytes.
pub fn wrap(path: &Path, content: &str) -> String {
    let leader = comment_leader(path);
    let body = content.trim_end_matches('\n');
    format!("{leader} {BEGIN_MARKER}\n{body}\n{leader} {END_MARKER}\n")
}

/// Replace the generated region of `existing` with freshly wrapped `content`.
///
/// Everything before the begin marker line and after the end marker line is
/// kept byte for byte. Returns `None` when `existing` has no complete marker
/// pair, i.e. the file is user-owned.
pub fn merge(existing: &str, path: &Path, content: &str) -> Option<String> {
    let leader = comment_leader(path);
    let begin_line = format!("{leader} {BEGIN_MARKER}");
    let end_line = format!("{leader} {END_MARKER}");

    let mut offset = 0;
    let mut begin = None;
    let mut end = None;
    for line in existing.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if begin.is_none() && trimmed == begin_line {
            begin = Some(offset);
        } else if begin.is_some() && trimmed == end_line {
            end = Some(offset + line.len());
            break;
        }
        offset += line.len();
    }
    let (begin, end) = (begin?, end?);

    let mut merged = String::with_capacity(existing.len() + content.len());
    merged.push_str(&existing[..begin]);
    merged.push_str(&wrap(path, content));
    merged.push_str(&existing[end..]);
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_uses_hash_comments() {
        let wrapped = wrap(Path::new("crds/a.yaml"), "kind: X\n\n");
        assert_eq!(
            wrapped,
            "# @kubeform:generated:begin\nkind: X\n# @kubeform:generated:end\n"
        );
    }

    #[test]
    fn merge_keeps_user_code_around_the_region() {
        let path = Path::new("alert.rs");
        let existing = format!(
            "// user header\n{}// user footer\nfn extra() {{}}\n",
            wrap(path, "pub struct Old;")
        );
        let merged = merge(&existing, path, "pub struct New;\n").unwrap();
        assert!(merged.starts_with("// user header\n// @kubeform:generated:begin\n"));
        assert!(merged.contains("pub struct New;"));
        assert!(!merged.contains("pub struct Old;"));
        assert!(merged.ends_with("// @kubeform:generated:end\n// user footer\nfn extra() {}\n"));
    }

    #[test]
    fn merge_is_stable_on_its_own_output() {
        let path = Path::new("alert.rs");
        let once = merge(&wrap(path, "a"), path, "b").unwrap();
        let twice = merge(&once, path, "b").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unmarked_files_are_user_owned() {
        let path = Path::new("alert.rs");
        assert!(merge("fn main() {}\n", path, "x").is_none());
        let dangling = format!("// {BEGIN_MARKER}\nno end\n");
        assert!(merge(&dangling, path, "x").is_none());
    }
}
