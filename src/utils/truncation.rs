const MAX_OUTPUT_LENGTH: usize = 15_000;
const MAX_ERROR_LENGTH: usize = 2_000;

/// Keep the head and tail of long command output.
pub fn truncate_output(output: &str) -> String {
    let total = output.chars().count();
    if total <= MAX_OUTPUT_LENGTH {
        output.to_string()
    } else {
        let half = MAX_OUTPUT_LENGTH / 2;
        let start: String = output.chars().take(half).collect();
        let end: String = output.chars().skip(total - half).collect();
        format!("{}\n\n... [truncated {} chars] ...\n\n{}", start, total - MAX_OUTPUT_LENGTH, end)
    }
}

pub fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LENGTH {
        error.to_string()
    } else {
        let head: String = error.chars().take(MAX_ERROR_LENGTH).collect();
        format!("{}...", head)
    }
}

/// Single-line preview of a shell command for log fields.
pub fn preview_command(command: &str) -> String {
    let line = command.lines().next().unwrap_or("");
    let preview: String = line.chars().take(80).collect();
    if preview.len() < command.len() {
        format!("{}...", preview)
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_untouched() {
        assert_eq!(truncate_output("hello"), "hello");
    }

    #[test]
    fn test_long_output_keeps_head_and_tail() {
        let output = format!("{}{}", "a".repeat(10_000), "b".repeat(10_000));
        let truncated = truncate_output(&output);
        assert!(truncated.starts_with("aaaa"));
        assert!(truncated.ends_with("bbbb"));
        assert!(truncated.contains("[truncated 5000 chars]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let error = "성공".repeat(1_500);
        let truncated = truncate_error(&error);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_ERROR_LENGTH + 3);
    }

    #[test]
    fn test_preview_command() {
        assert_eq!(preview_command("ls -la"), "ls -la");
        assert_eq!(preview_command("cat <<EOF\nbody\nEOF"), "cat <<EOF...");
    }
}
