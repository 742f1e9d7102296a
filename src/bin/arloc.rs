//! arloc - visual localization against a cloud map.
//!
//! Subcommands:
//! 1. `authorize`: check that the configured credentials yield a token
//! 2. `localize`: localize a still image with known intrinsics
//! 3. `map-details`: print metadata for one map
//! 4. `simulate`: run the full capture pipeline on the headless stub runtime
//!
//! Credentials and endpoints come from `ARLOC_CONFIG` and `ARLOC_*` variables.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use ar_localize::capture::pixels::{encode_jpeg, JPEG_QUALITY};
use ar_localize::ui::{Stage, Ui, UiMode};
use ar_localize::{
    CameraIntrinsics, CapturedFrame, LocalizationClient, LocalizationResult, LocalizerConfig,
    Notifications, StubRuntime, XrController,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Localize camera frames against a cloud-hosted 3-D map"
)]
struct Args {
    /// Progress output.
    #[arg(long, env = "ARLOC_UI", global = true, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange client credentials for an access token.
    Authorize,

    /// Localize a still image (JPEG or PNG) with the given intrinsics.
    Localize {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        fx: f64,
        #[arg(long)]
        fy: f64,
        /// Principal point x; defaults to the image center.
        #[arg(long)]
        px: Option<f64>,
        /// Principal point y; defaults to the image center.
        #[arg(long)]
        py: Option<f64>,
    },

    /// Print metadata for a map.
    MapDetails { map_id: String },

    /// Run initialize, session start and one capture on the headless runtime.
    Simulate,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("load configuration");
        LocalizerConfig::load().context("load configuration")?
    };
    let notifications = Notifications::default().on_error(|err| {
        log::error!("{:#}", err);
    });
    let mut client = LocalizationClient::new(config).with_notifications(notifications);

    authorize(&ui, &mut client)?;

    match args.command {
        Command::Authorize => {
            let expires = client
                .token()
                .and_then(|token| token.expires_on.clone())
                .unwrap_or_else(|| "unknown".to_string());
            println!("authorized (token expires: {})", expires);
        }
        Command::Localize {
            image,
            fx,
            fy,
            px,
            py,
        } => {
            let (frame, intrinsics) = {
                let mut stage = ui.stage("encode image");
                let loaded = load_frame(&image, fx, fy, px, py)?;
                stage.detail(format!(
                    "{}x{}, {} bytes",
                    loaded.0.width,
                    loaded.0.height,
                    loaded.0.byte_len()
                ));
                loaded
            };
            let result = {
                let mut stage = ui.stage("localize");
                let result = client.localize_with_frame(&frame, &intrinsics)?;
                describe_pose(&mut stage, &result);
                result
            };
            print_result(result)?;
        }
        Command::MapDetails { map_id } => {
            let details = {
                let mut stage = ui.stage("fetch map details");
                let details = client.fetch_map_details(&map_id)?;
                if let Some(name) = details.display_name() {
                    stage.detail(name);
                }
                details
            };
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Simulate => {
            let runtime = StubRuntime::new();
            let mut controller = XrController::new(runtime.clone(), client, None);
            {
                let _stage = ui.stage("initialize AR environment");
                controller.initialize(None)?;
            }
            runtime.start_session();
            let result = {
                let mut stage = ui.stage("capture and localize");
                let result = controller.capture_frame()?;
                describe_pose(&mut stage, &result);
                result
            };
            controller.dispose();
            print_result(result)?;
        }
    }
    Ok(())
}

fn authorize(ui: &Ui, client: &mut LocalizationClient) -> Result<()> {
    let mut stage = ui.stage("authorize");
    if let Err(err) = client.authorize() {
        stage.fail();
        return Err(err);
    }
    Ok(())
}

fn describe_pose(stage: &mut Stage, result: &Option<LocalizationResult>) {
    match result {
        Some(result) => stage.detail(format!(
            "pose found, confidence {:.2}",
            result.localize_data.confidence
        )),
        None => stage.detail("no pose"),
    }
}

fn load_frame(
    path: &Path,
    fx: f64,
    fy: f64,
    px: Option<f64>,
    py: Option<f64>,
) -> Result<(CapturedFrame, CameraIntrinsics)> {
    let image = image::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    let jpeg = encode_jpeg(image.as_raw(), width, height, JPEG_QUALITY)?;
    if jpeg.is_empty() {
        return Err(anyhow!("image {} is empty", path.display()));
    }
    let intrinsics = CameraIntrinsics {
        fx,
        fy,
        px: px.unwrap_or(width as f64 / 2.0),
        py: py.unwrap_or(height as f64 / 2.0),
        width,
        height,
    };
    Ok((CapturedFrame::new(jpeg, width, height), intrinsics))
}

fn print_result(result: Option<LocalizationResult>) -> Result<()> {
    match result {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => println!("no pose found"),
    }
    Ok(())
}
