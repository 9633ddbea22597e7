//! Best-effort text extraction from course sources.
//!
//! Course pages are React components, not documents, so extraction is
//! deliberately lossy: imports, comments, `{...}` expressions, and tags are
//! stripped, leaving the human-visible strings between them. Markdown is
//! kept as-is apart from whitespace normalization.
//!
//! | Extension | Handling | Title hint |
//! |-----------|----------|------------|
//! | `.md`, `.markdown` | normalize only | first `#` heading |
//! | `.jsx`, `.tsx`, `.js`, `.ts` | strip markup, scan `courseId`/`moduleId` | first line of 8+ chars |
//! | anything else | normalize only | none |
//!
//! Extraction never fails on malformed input; it degrades to whatever text
//! survives the stripping passes.

use anyhow::Result;
use regex::Regex;

use crate::models::ExtractedDoc;

const MIN_MARKUP_TITLE_CHARS: usize = 8;

/// `courseId="..."` prop as written on lesson components.
pub const COURSE_ATTR_PATTERN: &str = r#"courseId="([^"]+)""#;
/// `moduleId="..."` prop as written on lesson components.
pub const MODULE_ATTR_PATTERN: &str = r#"moduleId="([^"]+)""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Markdown,
    Markup,
    Plain,
}

impl SourceKind {
    pub fn from_path(path: &str) -> Self {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => SourceKind::Markdown,
            Some("jsx") | Some("tsx") | Some("js") | Some("ts") => SourceKind::Markup,
            _ => SourceKind::Plain,
        }
    }
}

/// Compiled patterns for extraction and normalization.
///
/// Build once with [`ContentExtractor::new`] and reuse for every file in an
/// index run.
pub struct ContentExtractor {
    jsx_comment: Regex,
    js_expression: Regex,
    tag: Regex,
    import_export: Regex,
    course_attr: Regex,
    module_attr: Regex,
    inline_space: Regex,
    space_runs: Regex,
    padded_newline: Regex,
    blank_runs: Regex,
}

impl ContentExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            jsx_comment: Regex::new(r"\{/\*[\s\S]*?\*/\}")?,
            js_expression: Regex::new(r"\{[\s\S]*?\}")?,
            tag: Regex::new(r"<[^>]+>")?,
            import_export: Regex::new(r"(?m)^\s*(import|export)\b.*$")?,
            course_attr: Regex::new(COURSE_ATTR_PATTERN)?,
            module_attr: Regex::new(MODULE_ATTR_PATTERN)?,
            inline_space: Regex::new(r"[\t\x0C\x0B]+")?,
            space_runs: Regex::new(r" +")?,
            padded_newline: Regex::new(r" *\n *")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    /// Extract readable text, ids, and a title hint from `content`.
    ///
    /// `path` only selects the handling by extension; nothing is read.
    pub fn extract_file_text(&self, path: &str, content: &str) -> ExtractedDoc {
        match SourceKind::from_path(path) {
            SourceKind::Markdown => self.extract_markdown(content),
            SourceKind::Markup => self.extract_markup(content),
            SourceKind::Plain => ExtractedDoc {
                text: self.normalize(content),
                ..ExtractedDoc::default()
            },
        }
    }

    fn extract_markup(&self, source: &str) -> ExtractedDoc {
        let (course_id, module_id) = self.scan_ids(source);

        let text = self.import_export.replace_all(source, "");
        let text = self.jsx_comment.replace_all(&text, "\n");
        let text = self.js_expression.replace_all(&text, "\n");
        let text = self.tag.replace_all(&text, "\n");
        let text = text.replace("</>", "\n").replace("<>", "\n");
        let text = self.normalize(&text);

        let title_hint = text
            .lines()
            .map(str::trim)
            .find(|line| line.chars().count() >= MIN_MARKUP_TITLE_CHARS)
            .map(String::from);

        ExtractedDoc {
            text,
            course_id,
            module_id,
            title_hint,
        }
    }

    fn extract_markdown(&self, source: &str) -> ExtractedDoc {
        let text = self.normalize(source);
        let title_hint = text
            .lines()
            .filter(|line| line.starts_with('#'))
            .map(|line| line.trim_start_matches('#').trim())
            .find(|title| !title.is_empty())
            .map(String::from);

        ExtractedDoc {
            text,
            title_hint,
            ..ExtractedDoc::default()
        }
    }

    /// First `courseId="..."` and `moduleId="..."` attribute values in `text`.
    pub fn scan_ids(&self, text: &str) -> (Option<String>, Option<String>) {
        let grab = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        (grab(&self.course_attr), grab(&self.module_attr))
    }

    /// Unify line endings, collapse horizontal whitespace, and cap blank
    /// lines at one.
    pub fn normalize(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.inline_space.replace_all(&text, " ");
        let text = self.space_runs.replace_all(&text, " ");
        let text = self.padded_newline.replace_all(&text, "\n");
        let text = self.blank_runs.replace_all(&text, "\n\n");
        text.trim().to_string()
    }
}

/// Course id taken from the directory right after `marker` in `path`.
///
/// `frontend/src/courses/data-structures/Arrays.jsx` with marker `courses`
/// yields `data-structures`. A file sitting directly in the marker directory
/// has no course.
pub fn infer_course_id_from_path(path: &str, marker: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();
    let pos = segments.iter().position(|s| *s == marker)?;
    // The segment after the marker must itself be a directory.
    if pos + 2 >= segments.len() {
        return None;
    }
    Some(segments[pos + 1].to_string())
}
