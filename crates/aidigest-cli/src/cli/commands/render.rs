use std::fs;
use std::io::Read;
use std::path::Path;

use aidigest_markdown::markdown_to_html;
use anyhow::{Context, Result};

pub fn run(file: Option<&Path>) -> Result<()> {
    let markdown = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read markdown from {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("read markdown from stdin")?;
            input
        }
    };
    println!("{}", markdown_to_html(&markdown));
    Ok(())
}
