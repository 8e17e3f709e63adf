use anyhow::Result;
use clap::Parser;

use pdf_ai_audio_rust::credentials;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-ai-audio-rust",
    version,
    about = "Analyze PDFs with Gemini and read them aloud"
)]
struct Cli {
    /// PDF file(s) to process once and exit; without this the web app is served
    #[arg(short = 'd', long = "data", num_args = 1..)]
    data: Vec<String>,

    /// Analysis to run on the PDF text (synthesis, validation, action-items, critique)
    #[arg(short = 'a', long = "analysis")]
    analysis: Option<String>,

    /// Write the cleaned text as MP3 to this path
    #[arg(short = 'o', long = "audio-out")]
    audio_out: Option<String>,

    /// Voice for synthesis (standard, female, male)
    #[arg(long = "voice")]
    voice: Option<String>,

    /// Speech engine (basic, neural)
    #[arg(short = 'e', long = "engine")]
    engine: Option<String>,

    /// Gemini model name
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables and secrets)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Address for the web app (default from settings [server] addr)
    #[arg(long = "addr")]
    addr: Option<String>,

    /// Append model name and token usage to the analysis
    #[arg(long = "with-using-tokens")]
    with_using_tokens: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_ai_audio_rust::logging::init(cli.verbose)?;
    credentials::load_dotenv();

    let config = pdf_ai_audio_rust::Config {
        model: cli.model,
        key: cli.key,
        engine: cli.engine,
        settings_path: cli.read_settings,
        addr: cli.addr,
        data: cli.data,
        analysis: cli.analysis,
        audio_out: cli.audio_out,
        voice: cli.voice,
        with_using_tokens: cli.with_using_tokens,
    };
    let services = pdf_ai_audio_rust::prepare(&config, credentials::prompt_for_key)?;

    if config.data.is_empty() {
        return pdf_ai_audio_rust::serve(config, services).await;
    }
    let output = pdf_ai_audio_rust::run(config, services).await?;
    println!("{}", output);
    Ok(())
}
