use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dressme_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use dressme_contracts::credentials::{CredentialStore, FileCredentialStore};
use dressme_contracts::events::{new_session_id, EventWriter};
use dressme_contracts::media::Slot;
use dressme_engine::config::non_empty_env;
use dressme_engine::{
    default_backend_registry, ImageNormalizer, Studio, StudioConfig, StudioError, StudioStatus,
};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "dressme", version, about = "Dress a model photo in garment photos")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Provider::Gemini, global = true)]
    provider: Provider,
    #[arg(long, default_value = "dressme-out", global = true)]
    out: PathBuf,
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[arg(long, global = true)]
    video_model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Gemini,
    Dryrun,
}

impl Provider {
    fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Dryrun => "dryrun",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage the stored API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Convert an upload to its canonical PNG or JPEG form.
    Normalize(NormalizeArgs),
    /// Generate a look from a model photo and garment photos.
    Look(LookArgs),
    /// Change the background of an existing look.
    Background(BackgroundArgs),
    /// Animate an existing look into a short video.
    Video(VideoArgs),
    /// Interactive session driven by slash commands.
    Session,
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { key: String },
    Clear,
    Status,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Parser)]
struct LookArgs {
    #[arg(long)]
    model: PathBuf,
    #[arg(long)]
    top: Option<PathBuf>,
    #[arg(long)]
    bottom: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct BackgroundArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Parser)]
struct VideoArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("dressme error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Key { action } => run_key(&cli, action),
        Command::Normalize(args) => run_normalize(args),
        Command::Look(args) => run_look(&cli, args),
        Command::Background(args) => run_background(&cli, args),
        Command::Video(args) => run_video(&cli, args),
        Command::Session => {
            run_session(&cli)?;
            Ok(0)
        }
    }
}

fn credentials_path(cli: &Cli) -> Result<PathBuf> {
    resolve_credentials_path(
        cli.credentials.as_deref(),
        non_empty_env("DRESSME_HOME"),
        env::var_os("HOME"),
    )
}

/// `--credentials` wins, then `$DRESSME_HOME/credentials.json`, then
/// `$HOME/.dressme/credentials.json`.
fn resolve_credentials_path(
    flag: Option<&Path>,
    dressme_home: Option<String>,
    home: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    let dir = match dressme_home {
        Some(dir) => PathBuf::from(dir),
        None => home
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(".dressme"))
            .context("cannot locate the credential file: set DRESSME_HOME or --credentials")?,
    };
    Ok(dir.join("credentials.json"))
}

fn open_studio(cli: &Cli) -> Result<Studio> {
    let mut config = StudioConfig::from_env();
    if let Some(model) = cli.image_model.clone() {
        config.image_model = model;
    }
    if let Some(model) = cli.video_model.clone() {
        config.video_model = model;
    }

    let mut registry = default_backend_registry(&config);
    let Some(backend) = registry.take(cli.provider.as_str()) else {
        bail!(
            "unknown provider {} (available: {})",
            cli.provider.as_str(),
            registry.names().join(", ")
        );
    };

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(credentials_path(cli)?));
    let events_path = cli
        .events
        .clone()
        .unwrap_or_else(|| cli.out.join("events.jsonl"));
    let events = EventWriter::new(events_path, new_session_id());
    debug!(provider = cli.provider.as_str(), out = %cli.out.display(), "opening studio");
    Studio::new(config, backend, credentials, events, &cli.out)
        .with_context(|| format!("failed to prepare output dir {}", cli.out.display()))
}

fn run_key(cli: &Cli, action: &KeyAction) -> Result<i32> {
    let path = credentials_path(cli)?;
    match action {
        KeyAction::Set { key } => {
            let studio = open_studio(cli)?;
            if !studio.login(key)? {
                bail!("API key was rejected by the provider");
            }
            println!("API key stored in {}", path.display());
        }
        KeyAction::Clear => {
            FileCredentialStore::new(&path)
                .remove()
                .with_context(|| format!("failed to update {}", path.display()))?;
            println!("API key removed");
        }
        KeyAction::Status => {
            let stored = FileCredentialStore::new(&path).get().is_some();
            if stored {
                println!("API key: stored ({})", path.display());
            } else {
                println!("API key: not set");
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn run_normalize(args: &NormalizeArgs) -> Result<i32> {
    let image = ImageNormalizer::new().normalize_path(&args.input)?;
    let bytes = image.canonical_bytes()?;
    write_output(&args.output, &bytes)?;
    let dims = image
        .dimensions()
        .map(|(w, h)| format!(" {w}x{h}"))
        .unwrap_or_default();
    if image.was_converted() {
        println!(
            "Converted {} to {}{dims}: {}",
            image.source().declared_type,
            image.mime_type(),
            args.output.display()
        );
    } else {
        println!("Copied {}: {}", image.mime_type(), args.output.display());
    }
    Ok(0)
}

fn run_look(cli: &Cli, args: &LookArgs) -> Result<i32> {
    let mut studio = open_studio(cli)?;
    upload_from_path(&mut studio, Slot::Model, &args.model)?;
    if let Some(top) = args.top.as_deref() {
        upload_from_path(&mut studio, Slot::Top, top)?;
    }
    if let Some(bottom) = args.bottom.as_deref() {
        upload_from_path(&mut studio, Slot::Bottom, bottom)?;
    }
    studio.generate_look()?;
    let path = studio.save_look()?;
    println!("Look saved: {}", path.display());
    Ok(0)
}

fn run_background(cli: &Cli, args: &BackgroundArgs) -> Result<i32> {
    let mut studio = open_studio(cli)?;
    studio
        .load_look(&args.image)
        .with_context(|| format!("failed to load look {}", args.image.display()))?;
    studio.edit_background(&args.prompt)?;
    let path = studio.save_look()?;
    println!("Look saved: {}", path.display());
    Ok(0)
}

fn run_video(cli: &Cli, args: &VideoArgs) -> Result<i32> {
    let mut studio = open_studio(cli)?;
    studio
        .load_look(&args.image)
        .with_context(|| format!("failed to load look {}", args.image.display()))?;
    println!("Generating video. This can take a few minutes.");
    let path = studio.generate_video(args.prompt.as_deref())?;
    println!("Video saved: {}", path.display());
    Ok(0)
}

fn upload_from_path(studio: &mut Studio, slot: Slot, path: &Path) -> Result<()> {
    let image = studio
        .upload_path(slot, path)
        .with_context(|| format!("failed to load {slot} image {}", path.display()))?;
    println!("{}", describe_upload(slot, image));
    Ok(())
}

fn describe_upload(slot: Slot, image: &dressme_contracts::media::UploadedImage) -> String {
    let source = image.source();
    let name = source.name.as_deref().unwrap_or("upload");
    if image.was_converted() {
        let dims = image
            .dimensions()
            .map(|(w, h)| format!(", {w}x{h}"))
            .unwrap_or_default();
        format!(
            "{slot}: {name} (converted from {} to {}{dims})",
            source.declared_type,
            image.mime_type()
        )
    } else {
        format!("{slot}: {name} ({})", image.mime_type())
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn print_status(out: &mut impl Write, status: &StudioStatus) -> io::Result<()> {
    let slots = if status.filled_slots.is_empty() {
        "none".to_string()
    } else {
        status
            .filled_slots
            .iter()
            .map(|slot| slot.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    writeln!(out, "Provider: {}", status.provider)?;
    writeln!(
        out,
        "API key: {}",
        if status.has_credential { "stored" } else { "not set" }
    )?;
    writeln!(out, "Image model: {}", status.image_model)?;
    writeln!(out, "Edit model: {}", status.edit_model)?;
    writeln!(out, "Video model: {}", status.video_model)?;
    writeln!(out, "Slots: {slots}")?;
    writeln!(out, "Look: {}", if status.has_look { "ready" } else { "none" })?;
    match status.video.as_deref() {
        Some(path) => writeln!(out, "Video: {}", path.display())?,
        None => writeln!(out, "Video: none")?,
    }
    if let Some(job) = status.active_job {
        writeln!(out, "Running: {job}")?;
    }
    Ok(())
}

fn report_failure(out: &mut impl Write, action: &str, err: &StudioError) -> io::Result<()> {
    writeln!(out, "{action} failed: {}", err.user_message())
}

fn run_session(cli: &Cli) -> Result<()> {
    let mut studio = open_studio(cli)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    writeln!(stdout, "DressMe session started. Type /help for commands.")?;
    if !studio.status().has_credential {
        writeln!(stdout, "No API key stored yet. Use /key <API key> first.")?;
    }

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }
        handle_intent(&mut studio, &intent, &mut stdout)?;
    }
    Ok(())
}

/// Runs one session command against `studio`, writing replies to `out`.
/// Studio failures are reported to the user; only I/O and event log
/// errors end the session.
fn handle_intent(studio: &mut Studio, intent: &Intent, out: &mut impl Write) -> Result<()> {
    match intent.action.as_str() {
        "help" => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            writeln!(out, "Any other text changes the background of the current look.")?;
        }
        "status" => print_status(out, &studio.status())?,
        "set_slot" => {
            let slot = intent.arg_str("slot").and_then(Slot::parse);
            let (Some(slot), Some(path)) = (slot, intent.arg_str("path")) else {
                writeln!(out, "Usage: /model <path>, /top <path>, /bottom <path>")?;
                return Ok(());
            };
            match studio.upload_path(slot, Path::new(path)) {
                Ok(image) => writeln!(out, "{}", describe_upload(slot, image))?,
                Err(err) => report_failure(out, "Upload", &err)?,
            }
            if studio.can_generate() {
                writeln!(out, "Ready: type /look to generate.")?;
            }
        }
        "clear_slot" => {
            let Some(slot) = intent.arg_str("slot").and_then(Slot::parse) else {
                writeln!(out, "Usage: /clear <model|top|bottom>")?;
                return Ok(());
            };
            if studio.clear_slot(slot)? {
                writeln!(out, "Cleared {slot}")?;
            } else {
                writeln!(out, "{slot} was already empty")?;
            }
        }
        "generate_look" => {
            writeln!(out, "Generating look...")?;
            match studio.generate_look() {
                Ok(look) => writeln!(
                    out,
                    "Look ready ({} bytes). Use /save to keep it or /video to animate it.",
                    look.bytes().len()
                )?,
                Err(err) => report_failure(out, "Look", &err)?,
            }
        }
        "edit_background" => {
            let prompt = intent.prompt.as_deref().unwrap_or_default();
            writeln!(out, "Changing background...")?;
            match studio.edit_background(prompt) {
                Ok(_) => writeln!(out, "Background updated.")?,
                Err(err) => report_failure(out, "Background edit", &err)?,
            }
        }
        "generate_video" => {
            writeln!(out, "Generating video. This can take a few minutes.")?;
            match studio.generate_video(intent.prompt.as_deref()) {
                Ok(path) => writeln!(out, "Video saved: {}", path.display())?,
                Err(err) => report_failure(out, "Video", &err)?,
            }
        }
        "save_look" => match studio.save_look() {
            Ok(path) => writeln!(out, "Look saved: {}", path.display())?,
            Err(err) => report_failure(out, "Save", &err)?,
        },
        "set_key" => {
            let Some(key) = intent.arg_str("key") else {
                writeln!(out, "Usage: /key <API key>")?;
                return Ok(());
            };
            if studio.login(key)? {
                writeln!(out, "API key verified and stored.")?;
            } else {
                writeln!(out, "Invalid API key. Please check it and try again.")?;
            }
        }
        "logout" => {
            studio.logout()?;
            writeln!(out, "Logged out. API key and session images cleared.")?;
        }
        "set_image_model" | "set_video_model" => {
            let Some(model) = intent.arg_str("model") else {
                writeln!(out, "Usage: /{} <name>", intent.action.trim_start_matches("set_"))?;
                return Ok(());
            };
            let selected = if intent.action == "set_image_model" {
                studio.set_image_model(model)
            } else {
                studio.set_video_model(model)
            };
            match selected {
                Ok(name) if name == model => writeln!(out, "Model set to {name}")?,
                Ok(name) => writeln!(out, "{model} is not available here; using {name}")?,
                Err(err) => report_failure(out, "Model change", &err)?,
            }
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
        }
        other => debug!(action = other, "ignored intent"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;

    use dressme_contracts::chat::parse_intent;
    use dressme_contracts::credentials::MemoryCredentialStore;
    use dressme_contracts::events::EventWriter;
    use dressme_contracts::media::{SourceFile, Slot};
    use dressme_engine::backend::DryrunBackend;
    use dressme_engine::{ImageNormalizer, Studio, StudioConfig};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    use super::{describe_upload, handle_intent, resolve_credentials_path};

    fn dryrun_studio(dir: &Path) -> anyhow::Result<Studio> {
        Ok(Studio::new(
            StudioConfig::default(),
            Box::new(DryrunBackend::new()),
            Arc::new(MemoryCredentialStore::with_key("test-key")),
            EventWriter::disabled("cli-test"),
            dir.join("out"),
        )?)
    }

    fn encoded(format: ImageFormat, width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image).write_to(&mut out, format)?;
        Ok(out.into_inner())
    }

    fn run_line(studio: &mut Studio, line: &str) -> anyhow::Result<String> {
        let mut out = Vec::new();
        handle_intent(studio, &parse_intent(line), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn credentials_flag_beats_environment() -> anyhow::Result<()> {
        let path = resolve_credentials_path(
            Some(Path::new("/tmp/keys.json")),
            Some("/srv/dressme".to_string()),
            Some(OsString::from("/home/ana")),
        )?;
        assert_eq!(path, Path::new("/tmp/keys.json"));
        Ok(())
    }

    #[test]
    fn credentials_fall_back_from_dressme_home_to_home() -> anyhow::Result<()> {
        let from_dressme_home = resolve_credentials_path(
            None,
            Some("/srv/dressme".to_string()),
            Some(OsString::from("/home/ana")),
        )?;
        assert_eq!(from_dressme_home, Path::new("/srv/dressme/credentials.json"));

        let from_home = resolve_credentials_path(None, None, Some(OsString::from("/home/ana")))?;
        assert_eq!(from_home, Path::new("/home/ana/.dressme/credentials.json"));

        let err = resolve_credentials_path(None, None, None)
            .err()
            .ok_or_else(|| anyhow::anyhow!("resolved a path without any home"))?;
        assert!(err.to_string().contains("DRESSME_HOME"));
        assert!(resolve_credentials_path(None, None, Some(OsString::new())).is_err());
        Ok(())
    }

    #[test]
    fn commands_without_arguments_print_usage() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = dryrun_studio(temp.path())?;

        assert_eq!(
            run_line(&mut studio, "/model")?,
            "Usage: /model <path>, /top <path>, /bottom <path>\n"
        );
        assert_eq!(
            run_line(&mut studio, "/clear")?,
            "Usage: /clear <model|top|bottom>\n"
        );
        assert_eq!(
            run_line(&mut studio, "/clear shoes")?,
            "Usage: /clear <model|top|bottom>\n"
        );
        assert_eq!(run_line(&mut studio, "/key")?, "Usage: /key <API key>\n");
        assert_eq!(
            run_line(&mut studio, "/magic wand")?,
            "Unknown command /magic. Type /help for commands.\n"
        );
        assert!(studio.status().filled_slots.is_empty());
        Ok(())
    }

    #[test]
    fn slot_commands_fill_and_clear_slots() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let model = temp.path().join("model.png");
        std::fs::write(&model, encoded(ImageFormat::Png, 24, 32)?)?;
        let top = temp.path().join("shirt.gif");
        std::fs::write(&top, encoded(ImageFormat::Gif, 16, 16)?)?;
        let notes = temp.path().join("notes.txt");
        std::fs::write(&notes, "not an image")?;
        let mut studio = dryrun_studio(temp.path())?;

        let reply = run_line(&mut studio, &format!("/model \"{}\"", model.display()))?;
        assert_eq!(reply, "model: model.png (image/png)\n");

        let reply = run_line(&mut studio, &format!("/top \"{}\"", top.display()))?;
        assert_eq!(
            reply,
            "top: shirt.gif (converted from image/gif to image/png, 16x16)\nReady: type /look to generate.\n"
        );

        let reply = run_line(&mut studio, &format!("/bottom \"{}\"", notes.display()))?;
        assert!(reply.starts_with("Upload failed: This file type is not supported"));
        assert!(reply.ends_with("Ready: type /look to generate.\n"));
        assert_eq!(studio.status().filled_slots, vec![Slot::Model, Slot::Top]);

        let reply = run_line(&mut studio, "/look")?;
        assert!(reply.starts_with("Generating look...\nLook ready ("));
        assert!(studio.current_look().is_some());

        assert_eq!(run_line(&mut studio, "/clear top")?, "Cleared top\n");
        assert_eq!(run_line(&mut studio, "/clear top")?, "top was already empty\n");
        assert_eq!(studio.status().filled_slots, vec![Slot::Model]);
        Ok(())
    }

    #[test]
    fn look_without_garment_reports_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = dryrun_studio(temp.path())?;
        let reply = run_line(&mut studio, "/look")?;
        assert!(reply.starts_with("Generating look...\nLook failed: "));
        assert!(studio.current_look().is_none());
        Ok(())
    }

    #[test]
    fn status_lists_models_and_slots() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = dryrun_studio(temp.path())?;
        let reply = run_line(&mut studio, "/status")?;
        assert!(reply.starts_with("Provider: dryrun\nAPI key: stored\n"));
        assert!(reply.contains("Edit model: "));
        assert!(reply.contains("Slots: none\n"));
        Ok(())
    }

    #[test]
    fn describe_upload_distinguishes_passthrough_and_conversion() -> anyhow::Result<()> {
        let normalizer = ImageNormalizer::new();
        let png = normalizer.normalize(SourceFile::new(
            Some("model.png".to_string()),
            "image/png",
            encoded(ImageFormat::Png, 10, 20)?,
        ))?;
        assert_eq!(describe_upload(Slot::Model, &png), "model: model.png (image/png)");

        let webp = normalizer.normalize(SourceFile::new(
            None,
            "image/webp",
            encoded(ImageFormat::WebP, 30, 40)?,
        ))?;
        assert_eq!(
            describe_upload(Slot::Bottom, &webp),
            "bottom: upload (converted from image/webp to image/png, 30x40)"
        );
        Ok(())
    }
}
