use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

use super::Rasterizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    Mutool,
    Pdftoppm,
}

/// Renders single PDF pages to PNG through `mutool draw` or `pdftoppm`.
#[derive(Debug, Clone)]
pub struct CommandRasterizer {
    tool: Tool,
}

impl CommandRasterizer {
    /// Picks the rendering tool. `preference` is `auto`, `mutool` or `pdftoppm`.
    pub fn detect(preference: &str) -> Result<Self> {
        let preference = preference.trim().to_ascii_lowercase();
        let tool = match preference.as_str() {
            "mutool" if command_exists("mutool") => Tool::Mutool,
            "pdftoppm" if command_exists("pdftoppm") => Tool::Pdftoppm,
            "mutool" | "pdftoppm" => {
                return Err(anyhow!("{} is not installed", preference));
            }
            _ if command_exists("mutool") => Tool::Mutool,
            _ if command_exists("pdftoppm") => Tool::Pdftoppm,
            _ => {
                return Err(anyhow!(
                    "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)"
                ));
            }
        };
        Ok(Self { tool })
    }
}

impl Rasterizer for CommandRasterizer {
    fn rasterize(&self, source: &[u8], page: usize, dpi: u32) -> Result<Vec<u8>> {
        let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
        let input_path = dir.path().join("input.pdf");
        fs::write(&input_path, source).with_context(|| "failed to write temp pdf")?;
        let page_number = (page + 1).to_string();
        let output_path = dir.path().join("page.png");

        let output = match self.tool {
            Tool::Mutool => Command::new("mutool")
                .arg("draw")
                .arg("-r")
                .arg(dpi.to_string())
                .arg("-o")
                .arg(&output_path)
                .arg(&input_path)
                .arg(&page_number)
                .output()
                .with_context(|| "failed to run mutool")?,
            Tool::Pdftoppm => Command::new("pdftoppm")
                .arg("-png")
                .arg("-r")
                .arg(dpi.to_string())
                .arg("-f")
                .arg(&page_number)
                .arg("-l")
                .arg(&page_number)
                .arg("-singlefile")
                .arg(&input_path)
                .arg(dir.path().join("page"))
                .output()
                .with_context(|| "failed to run pdftoppm")?,
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{:?} failed: {}", self.tool, stderr.trim()));
        }
        fs::read(&output_path).with_context(|| "failed to read rendered pdf page")
    }
}

fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let path_var = match env::var_os("PATH") {
        Some(value) => value,
        None => return false,
    };

    env::split_paths(&path_var).any(|dir| is_executable(&dir.join(cmd)))
}

fn is_executable(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
