mod chatctx;
mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod transcript;

fn main() {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
