//! Local filename sanitizing

use regex::Regex;
use std::sync::LazyLock;

// Pattern is a literal; a failure here is a programming error, not a runtime condition.
#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid literal regex"));

/// Derive the local filename for a downloaded file from its project path and
/// repository-relative file path.
///
/// The transform is total and deterministic: the two paths are joined with a
/// double underscore, every path separator becomes a double underscore, and
/// any remaining character outside `[A-Za-z0-9._-]` collapses to a single
/// underscore. Combining the project path with the file path keeps files with
/// the same name in different projects apart.
///
/// Known limitation: inputs that differ only in replaced characters (e.g.
/// `a/b` vs `a_b`) can map to the same name. Realistic repository paths don't
/// collide this way, so no disambiguation suffix is added.
///
/// # Examples
///
/// ```
/// use gitlab_dl::utils::sanitize_file_name;
///
/// let name = sanitize_file_name("group/app", "src/main.rs");
/// assert_eq!(name, "group__app__src__main.rs");
/// ```
pub fn sanitize_file_name(project_path: &str, file_path: &str) -> String {
    let combined = format!("{}__{}", project_path, file_path).replace('/', "__");
    UNSAFE_CHARS.replace_all(&combined, "_").into_owned()
}

/// Sanitize a single string for use in a directory or file name
///
/// Same character class as [`sanitize_file_name`] but without the path-separator
/// handling; used for query-derived output directory names.
pub fn sanitize_component(input: &str) -> String {
    UNSAFE_CHARS.replace_all(input, "_").into_owned()
}
