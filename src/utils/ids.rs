use chrono::Utc;
use uuid::Uuid;

/// Fresh reproduction id: `poc_{YYYYmmdd_HHMMSS_mmm}_{uuid-v4}`.
///
/// The timestamp keeps ids sortable; the full v4 uuid makes collisions
/// practically impossible even for ids minted in the same millisecond.
pub fn generate_reproduction_id() -> String {
    format!(
        "poc_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S_%3f"),
        Uuid::new_v4().simple()
    )
}

/// Replace anything outside docker's container-name alphabet and collapse
/// runs of separators.
pub fn sanitize_name(identifier: &str) -> String {
    let mapped: String = identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();

    let mut safe = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '_' && safe.ends_with('_') {
            continue;
        }
        safe.push(c);
    }
    safe.trim_matches(|c| c == '_' || c == '-' || c == '.').to_string()
}

pub fn container_name(prefix: &str, identifier: &str) -> String {
    format!("{}-{}", prefix, sanitize_name(identifier))
}
