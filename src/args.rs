use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "site-clone")]
#[command(about = "Clones a website into a single standalone HTML document")]
#[command(version)]
pub struct Args {
    /// Absolute http(s) URL of the page to clone
    pub url: String,

    /// Skip the browser render and generate from extracted content
    #[arg(short, long)]
    pub light: bool,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the cloned page here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// WebDriver server for browser renders (overrides config and WEBDRIVER_URL)
    #[arg(long)]
    pub webdriver_url: Option<String>,
}
