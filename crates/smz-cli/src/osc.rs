//! Terminal OSC sequences: progress (OSC 9;4) and hyperlinks (OSC 8).

const ESC: char = '\x1b';
const ST: &str = "\x1b\\";
const BEL: char = '\x07';

/// Sanitize a progress label: strip escape characters and `]`, then trim.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ESC && *c != ']' && *c != BEL && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Indeterminate progress frame.
pub fn progress_indeterminate(label: &str) -> String {
    format!("{ESC}]9;4;3;;{}{ST}", sanitize_label(label))
}

/// Determinate progress frame.
pub fn progress_set(percent: u8, label: &str) -> String {
    format!(
        "{ESC}]9;4;1;{};{}{ST}",
        percent.min(100),
        sanitize_label(label)
    )
}

/// Clear the progress indicator.
pub fn progress_clear(label: &str) -> String {
    format!("{ESC}]9;4;0;0;{}{ST}", sanitize_label(label))
}

/// OSC-8 hyperlink wrapping `text`.
pub fn hyperlink(url: &str, text: &str) -> String {
    format!("{ESC}]8;;{url}{BEL}{text}{ESC}]8;;{BEL}")
}

/// Whether the terminal advertises OSC 9;4 progress support.
pub fn supports_osc_progress(env: impl Fn(&str) -> Option<String>) -> bool {
    if env("NO_COLOR").is_some() {
        return false;
    }
    if env("WT_SESSION").is_some() {
        return true;
    }
    matches!(
        env("TERM_PROGRAM").as_deref(),
        Some("iTerm.app") | Some("WezTerm") | Some("ghostty")
    )
}

/// Rewrite markdown links `[text](url)` as terminal hyperlinks.
pub fn linkify_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find("](") else {
            break;
        };
        let close = open + close;
        let Some(end) = rest[close..].find(')') else {
            break;
        };
        let end = close + end;

        let label = &rest[open + 1..close];
        let url = &rest[close + 2..end];
        if label.is_empty() || url.is_empty() || url.contains(char::is_whitespace) {
            out.push_str(&rest[..open + 1]);
            rest = &rest[open + 1..];
            continue;
        }

        out.push_str(&rest[..open]);
        out.push_str(&hyperlink(url, label));
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("  Downloading video  "), "Downloading video");
        assert_eq!(sanitize_label("a\x1b]b]c"), "abc");
        assert_eq!(sanitize_label("x\x07y"), "xy");
    }

    #[test]
    fn test_progress_frames() {
        assert_eq!(progress_set(42, "detect"), "\x1b]9;4;1;42;detect\x1b\\");
        assert_eq!(progress_set(200, "x"), "\x1b]9;4;1;100;x\x1b\\");
        assert_eq!(
            progress_indeterminate("fetch"),
            "\x1b]9;4;3;;fetch\x1b\\"
        );
        assert_eq!(progress_clear("done"), "\x1b]9;4;0;0;done\x1b\\");
    }

    #[test]
    fn test_hyperlink_shape() {
        assert_eq!(
            hyperlink("https://a/", "label"),
            "\x1b]8;;https://a/\x07label\x1b]8;;\x07"
        );
    }

    #[test]
    fn test_linkify_markdown() {
        let out = linkify_markdown("see [the docs](https://docs.example/) for more");
        assert!(out.contains("\x1b]8;;https://docs.example/\x07the docs\x1b]8;;\x07"));
        assert!(out.starts_with("see "));
        assert!(out.ends_with(" for more"));
    }

    #[test]
    fn test_linkify_leaves_plain_text() {
        assert_eq!(linkify_markdown("no links here [really"), "no links here [really");
        assert_eq!(
            linkify_markdown("[not a link] (spaced)"),
            "[not a link] (spaced)"
        );
    }

    #[test]
    fn test_supports_osc_progress() {
        assert!(supports_osc_progress(|name| {
            (name == "TERM_PROGRAM").then(|| "WezTerm".to_string())
        }));
        assert!(supports_osc_progress(|name| {
            (name == "WT_SESSION").then(|| "x".to_string())
        }));
        assert!(!supports_osc_progress(|_| None));
        // NO_COLOR wins.
        assert!(!supports_osc_progress(|name| match name {
            "NO_COLOR" => Some("1".to_string()),
            "TERM_PROGRAM" => Some("WezTerm".to_string()),
            _ => None,
        }));
    }
}
