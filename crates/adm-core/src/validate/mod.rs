//! Pure validation leaves: URL Validator (spec.md §4.1) and Path Segment
//! Sanitizer (spec.md §4.2). Both are small, pure, table-driven functions —
//! the teacher's style for `url_model::sanitize` and `segmenter::range`.

mod path;
mod url;

pub use path::sanitize;
pub use url::validate_download_url;
