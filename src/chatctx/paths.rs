use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ChatCtxPaths {
    pub chatctx_home: PathBuf,
    pub logs_dir: PathBuf,
    pub store_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ChatCtxPaths> {
    let chatctx_home = match env::var("CHATCTX_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".chatctx"),
    };

    let logs_dir = env_or_default_path("CHATCTX_LOGS_DIR", chatctx_home.join("logs"));
    let store_file = env_or_default_path("CHATCTX_STORE_FILE", chatctx_home.join("sessions.json"));

    Ok(ChatCtxPaths {
        chatctx_home,
        logs_dir,
        store_file,
    })
}
