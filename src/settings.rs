use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    pub dpi: u32,
    pub min_confidence: f32,
    pub line_threshold: f32,
    pub languages: String,
    pub workers: usize,
    pub rasterizer: String,
    pub tesseract: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateConfig {
    pub copy_workers: usize,
    pub page_workers: usize,
    pub allow_approximate: bool,
    pub default_font: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ocr: OcrConfig,
    pub generate: GenerateConfig,
    pub server: ServerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            ocr: OcrConfig {
                dpi: 200,
                min_confidence: 30.0,
                line_threshold: 10.0,
                languages: "eng".to_string(),
                workers: cpus,
                rasterizer: "auto".to_string(),
                tesseract: "tesseract".to_string(),
            },
            generate: GenerateConfig {
                copy_workers: cpus,
                page_workers: 1,
                allow_approximate: true,
                default_font: "Helvetica".to_string(),
            },
            server: ServerConfig {
                addr: "127.0.0.1:8000".to_string(),
                upload_dir: PathBuf::from("uploads"),
                output_dir: PathBuf::from("outputs"),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    generate: Option<GenerateSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    dpi: Option<u32>,
    min_confidence: Option<f32>,
    line_threshold: Option<f32>,
    languages: Option<String>,
    workers: Option<usize>,
    rasterizer: Option<String>,
    tesseract: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateSettings {
    copy_workers: Option<usize>,
    page_workers: Option<usize>,
    allow_approximate: Option<bool>,
    default_font: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    upload_dir: Option<String>,
    output_dir: Option<String>,
}

/// Loads the embedded defaults and layers every settings file that exists on top.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Embedded defaults merged with each existing file of `paths`, in order.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
            tracing::debug!(path = %path.display(), "settings merged");
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(dpi) = ocr.dpi {
                if dpi > 0 {
                    self.ocr.dpi = dpi;
                }
            }
            if let Some(value) = ocr.min_confidence {
                self.ocr.min_confidence = value;
            }
            if let Some(value) = ocr.line_threshold {
                if value > 0.0 {
                    self.ocr.line_threshold = value;
                }
            }
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr.languages = languages;
                }
            }
            if let Some(workers) = ocr.workers {
                self.ocr.workers = workers_or_cpus(workers);
            }
            if let Some(rasterizer) = ocr.rasterizer {
                if !rasterizer.trim().is_empty() {
                    self.ocr.rasterizer = rasterizer;
                }
            }
            if let Some(command) = ocr.tesseract {
                if !command.trim().is_empty() {
                    self.ocr.tesseract = command;
                }
            }
        }
        if let Some(generate) = incoming.generate {
            if let Some(workers) = generate.copy_workers {
                self.generate.copy_workers = workers_or_cpus(workers);
            }
            if let Some(workers) = generate.page_workers {
                self.generate.page_workers = workers_or_cpus(workers);
            }
            if let Some(allow) = generate.allow_approximate {
                self.generate.allow_approximate = allow;
            }
            if let Some(font) = generate.default_font {
                if !font.trim().is_empty() {
                    self.generate.default_font = font;
                }
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server.addr = addr;
                }
            }
            if let Some(dir) = server.upload_dir {
                if !dir.trim().is_empty() {
                    self.server.upload_dir = PathBuf::from(dir);
                }
            }
            if let Some(dir) = server.output_dir {
                if !dir.trim().is_empty() {
                    self.server.output_dir = PathBuf::from(dir);
                }
            }
        }
    }

    pub fn segment_options(&self) -> crate::ocr::SegmentOptions {
        crate::ocr::SegmentOptions {
            min_confidence: self.ocr.min_confidence,
            line_threshold: self.ocr.line_threshold,
        }
    }
}

fn workers_or_cpus(value: usize) -> usize {
    if value == 0 {
        num_cpus::get().max(1)
    } else {
        value
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".docfill-rust"))
        }
    })
}
