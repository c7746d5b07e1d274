use std::path::{Path, PathBuf};

const APP_DIR: &str = "gamesense";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/gamesense/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        // Portable install: a data/ directory beside the executable wins
        if let Some(dir) = exe_dir() {
            let portable_data = dir.join("data");
            if portable_data.exists() {
                return portable_data;
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = exe_dir() {
            if dir.join("config.toml").exists() {
                return dir;
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

#[cfg(windows)]
fn exe_dir() -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    current_exe.parent().map(Path::to_path_buf)
}

/// Location of the engine's `coreProps.json`, which announces the address
/// the GameSense HTTP server is listening on.
pub fn core_props_path() -> PathBuf {
    #[cfg(windows)]
    {
        let program_data =
            std::env::var("PROGRAMDATA").unwrap_or_else(|_| "C:\\ProgramData".to_string());
        PathBuf::from(program_data)
            .join("SteelSeries")
            .join("SteelSeries Engine 3")
            .join("coreProps.json")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Library/Application Support/SteelSeries Engine 3/coreProps.json")
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // No official engine on Linux; a compatible bridge may drop the file here.
        config_dir().join("coreProps.json")
    }
}

#[derive(Debug, serde::Deserialize)]
struct CoreProps {
    address: String,
}

/// Read `address` from a `coreProps.json` file.
pub fn read_engine_address(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)?;
    parse_core_props(&content)
}

pub fn parse_core_props(content: &str) -> anyhow::Result<String> {
    let props: CoreProps = serde_json::from_str(content)?;
    let address = props.address.trim().to_string();
    if address.is_empty() {
        anyhow::bail!("coreProps.json has an empty address");
    }
    Ok(address)
}

pub fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    #[cfg(unix)]
    let sep = ":";
    #[cfg(windows)]
    let sep = ";";
    for dir in path.split(sep) {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}
