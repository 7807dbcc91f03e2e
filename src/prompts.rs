use std::path::{Path, PathBuf};

use crate::error::{ChooError, Result};

pub const SYSTEM_PROMPT_FILE: &str = "system-prompt.md";
pub const PROMPTS_DIR: &str = "prompts";

pub fn system_prompt_path(choo_dir: &Path) -> PathBuf {
    choo_dir.join(SYSTEM_PROMPT_FILE)
}

pub fn train_prompt_path(choo_dir: &Path, train_name: &str) -> PathBuf {
    choo_dir.join(PROMPTS_DIR).join(format!("{train_name}.md"))
}

/// The shared system prompt followed by the train's own prompt, separated by a blank line.
pub fn load_combined_prompt(train_name: &str, choo_dir: &Path) -> Result<String> {
    let system_path = system_prompt_path(choo_dir);
    if !system_path.is_file() {
        return Err(ChooError::Prompt(format!(
            "System prompt not found: {}",
            system_path.display()
        )));
    }
    let system = std::fs::read_to_string(&system_path)?;

    let train_path = train_prompt_path(choo_dir, train_name);
    if !train_path.is_file() {
        return Err(ChooError::Prompt(format!(
            "Train prompt not found: {}",
            train_path.display()
        )));
    }
    let train = std::fs::read_to_string(&train_path)?;

    Ok(format!("{}\n\n{}", system.trim(), train.trim()))
}
