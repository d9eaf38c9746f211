//! Extraction of fenced code blocks from generated text, and local
//! persistence of supported-language implementations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Matches ```lang ... ``` regions, non-greedy, across lines. Fences do not
/// nest in the expected input; an unterminated fence simply never matches.
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w+)?\n(.*?)```").expect("code block regex"));

/// Directory implementation files are written to, both locally and in the
/// remote branch.
pub const IMPLEMENTATIONS_DIR: &str = "ai_task_implementations";

/// A fenced code segment with its language tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Pull every fenced code block out of `text` in first-occurrence order. The
/// order matters downstream: the first block is embedded in PR bodies. The
/// language defaults to "text" when the fence carries no tag; content is
/// trimmed of surrounding whitespace.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK
        .captures_iter(text)
        .map(|caps| CodeBlock {
            language: caps.get(1).map_or("text", |m| m.as_str()).to_string(),
            code: caps[2].trim().to_string(),
        })
        .collect()
}

/// File extension for a supported implementation language. `None` means the
/// block is skipped rather than written with a default extension.
pub fn extension_for(language: &str) -> Option<&'static str> {
    match language {
        "python" => Some(".py"),
        "js" | "javascript" => Some(".js"),
        "typescript" => Some(".ts"),
        "java" => Some(".java"),
        "cpp" => Some(".cpp"),
        "c" => Some(".c"),
        "go" => Some(".go"),
        "rust" => Some(".rs"),
        _ => None,
    }
}

/// Numbered file name for the block at `index` (0-based position in the full
/// extracted list), or `None` for an unsupported language. Unsupported blocks
/// still consume an index, so local and remote numbering always line up.
pub fn implementation_file_name(index: usize, language: &str) -> Option<String> {
    extension_for(language).map(|ext| format!("ai_task_implementation_{}{}", index + 1, ext))
}

/// Write every supported-language block in `text` under `output_dir`.
/// Individual write failures are logged and skipped; returns the saved paths.
pub fn save_implementations(text: &str, output_dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;
    let mut saved = Vec::new();
    for (index, block) in extract_code_blocks(text).iter().enumerate() {
        let Some(name) = implementation_file_name(index, &block.language) else {
            continue;
        };
        let path = output_dir.join(name);
        match fs::write(&path, &block.code) {
            Ok(()) => saved.push(path),
            Err(err) => warn!(path = %path.display(), %err, "failed to write implementation file"),
        }
    }
    Ok(saved)
}
