use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(chatctx_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match (chatctx_home, home_dir) {
        (Some(base), _) => Some(base.join(".env")),
        (None, Some(home)) => Some(home.join(".chatctx").join(".env")),
        (None, None) => None,
    }
}

/// Load `.env` from the working directory, falling back to the chatctx home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("CHATCTX_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
