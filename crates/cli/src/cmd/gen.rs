//! Render a value as a symbol PNG

use anyhow::{Context, Result};
use std::path::Path;
use symbol::Symbology;

pub fn run(value: &str, symbology: &str, out: &Path) -> Result<()> {
    let symbology: Symbology = symbology.parse()?;

    symbol::generate(value, symbology, out)
        .with_context(|| format!("failed to render {:?} symbol", symbology))?;

    println!("Symbol written to {}", out.display());
    Ok(())
}
