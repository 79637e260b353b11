use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "sessiongate", about = "Access/refresh token session gateway")]
pub struct Cli {
    /// Path to a settings TOML file.
    #[arg(long)]
    pub settings: Option<String>,
}
