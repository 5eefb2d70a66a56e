use std::env;
use std::fs;
use std::path::PathBuf;

/// Resolve the log directory.
///
/// Resolution order:
/// 1. Custom directory from parameter (if provided)
/// 2. LONGFORM_LOG_DIR environment variable
/// 3. Platform data directory (e.g. ~/.local/share/longform/logs)
/// 4. Temp directory as last resort
pub fn get_log_directory(custom_dir: Option<&str>) -> Result<PathBuf, std::io::Error> {
    if let Some(dir) = custom_dir {
        return ensure_directory_exists(PathBuf::from(dir));
    }

    if let Ok(dir) = env::var("LONGFORM_LOG_DIR") {
        return ensure_directory_exists(PathBuf::from(dir));
    }

    if let Some(data_dir) = dirs::data_local_dir() {
        let path = data_dir.join("longform").join("logs");
        if ensure_directory_exists(path.clone()).is_ok() {
            return Ok(path);
        }
    }

    ensure_directory_exists(env::temp_dir().join("longform-logs"))
}

fn ensure_directory_exists(path: PathBuf) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(&path)?;
    Ok(path)
}
