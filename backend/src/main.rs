//! Trialforge CLI - Build trial and configuration files from form schemas
//!
//! # Main Commands
//!
//! ```bash
//! trialforge convert scenes.csv -r 3 --shuffle -o trial.json   # CSV to trial file
//! trialforge config values.json --out-dir ~/configs              # Configuration file
//! trialforge serve                                               # HTTP server (port 3000)
//! ```
//!
//! # Schema and Scene Management
//!
//! ```bash
//! trialforge schema list                      # Active schemas
//! trialforge schema import object obj.json    # Replace the object schema
//! trialforge decode scenes.csv --save         # Keep decoded scenes
//! trialforge assemble --stored <id> <id>      # Trials from saved scenes
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! trialforge validate-schema schema.json      # Check a schema file
//! trialforge parse scenes.csv                 # Tokenized CSV matrix
//! ```

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use trialforge::api::logs::LOG_BROADCASTER;
use trialforge::api::types::SceneRequest;
use trialforge::transform::decoder::{decode, DecodeOptions};
use trialforge::{
    assemble_trials, build_config_record, build_scene, convert_csv, load_schema, parse_csv_file_auto,
    validate, ConvertOptions, DocumentStore, FormKind, FormSchema, PipelineError, SceneRecord,
    SchemaError, StoreError, TrialOptions,
};

/// Port used when neither `--port` nor `PORT` is given
const DEFAULT_PORT: u16 = 3000;

#[derive(Parser)]
#[command(name = "trialforge", version)]
#[command(about = "Build VR experiment trial and configuration files from form schemas", long_about = None)]
struct Cli {
    /// Store directory (default: $TRIALFORGE_HOME or .trialforge)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Do not print progress logs
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema file (list of Form Entry Definitions)
    ValidateSchema {
        /// Schema JSON file
        input: PathBuf,
    },

    /// Tokenize a CSV file and output the cell matrix as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a CSV file into scene records
    Decode {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        schemas: SchemaArgs,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the scenes to the store
        #[arg(long)]
        save: bool,
    },

    /// Full pipeline: CSV → scenes → trial file
    Convert {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        schemas: SchemaArgs,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        #[command(flatten)]
        trial: TrialArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Assemble a trial file from scene records
    Assemble {
        /// JSON file with a list of scene records
        scenes: Option<PathBuf>,

        /// Ids of saved scenes (placed before the file's scenes)
        #[arg(long, num_args = 1..)]
        stored: Vec<String>,

        #[command(flatten)]
        trial: TrialArgs,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Build a configuration file from form values
    Config {
        /// JSON object of form values (missing keys use defaults)
        values: Option<PathBuf>,

        /// Config schema file (default: stored config schema)
        #[arg(long)]
        schema: Option<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Manage stored form schemas
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Manage saved scenes
    Scenes {
        #[command(subcommand)]
        action: ScenesAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// Scene schema file (default: stored scene schema)
    #[arg(long)]
    scene_schema: Option<PathBuf>,

    /// Object schema file (default: stored object schema)
    #[arg(long)]
    object_schema: Option<PathBuf>,
}

#[derive(Args)]
struct TrialArgs {
    /// How many times the scene list is repeated
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    repeat: u64,

    /// Randomize trial order
    #[arg(long)]
    shuffle: bool,
}

impl TrialArgs {
    fn options(&self) -> TrialOptions {
        TrialOptions {
            repeat_count: self.repeat as usize,
            shuffle: self.shuffle,
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Output file (default: stdout)
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Write <dir>/<name>.json and remember <dir> as the output path
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// File name (without .json) used with --out-dir
    #[arg(long, requires = "out_dir")]
    name: Option<String>,
}

#[derive(Subcommand)]
enum SchemaAction {
    /// List the active schemas
    List,

    /// Print a schema with its output path
    Show {
        /// scene, object or config
        kind: FormKind,
    },

    /// Replace a schema with a validated JSON file
    Import {
        /// scene, object or config
        kind: FormKind,
        /// Schema JSON file
        file: PathBuf,
    },

    /// Export the entries of a schema
    Export {
        /// scene, object or config
        kind: FormKind,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the built-in schema
    Reset {
        /// scene, object or config
        kind: FormKind,
    },
}

#[derive(Subcommand)]
enum ScenesAction {
    /// List saved scenes
    List,

    /// Build a scene from form values and save it
    Add {
        /// JSON file: { "scene": {...}, "objects": [{...}, ...] }
        file: PathBuf,
    },

    /// Delete a saved scene
    Delete {
        /// Scene ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let store = match cli.home {
        Some(ref dir) => DocumentStore::with_dir(dir),
        None => DocumentStore::new(),
    };

    let result = match cli.command {
        Commands::ValidateSchema { input } => cmd_validate_schema(&input),

        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Decode {
            input,
            schemas,
            delimiter,
            output,
            save,
        } => cmd_decode(&store, &input, &schemas, delimiter, output.as_deref(), save),

        Commands::Convert {
            input,
            schemas,
            delimiter,
            trial,
            out,
        } => cmd_convert(&store, &input, &schemas, delimiter, &trial, &out),

        Commands::Assemble {
            scenes,
            stored,
            trial,
            out,
        } => cmd_assemble(&store, scenes.as_deref(), &stored, &trial, &out),

        Commands::Config { values, schema, out } => {
            cmd_config(&store, values.as_deref(), schema.as_deref(), &out)
        }

        Commands::Schema { action } => cmd_schema(&store, action),

        Commands::Scenes { action } => cmd_scenes(&store, action),

        Commands::Serve { port } => cmd_serve(store, port).await,
    };

    if let Err(e) = result {
        report(e.as_ref());
        std::process::exit(1);
    }
}

/// Print an error with every message it carries
fn report(err: &(dyn std::error::Error + 'static)) {
    eprintln!("❌ Error: {}", err);

    let messages = if let Some(e) = err.downcast_ref::<PipelineError>() {
        e.messages()
    } else if let Some(StoreError::Schema(e)) = err.downcast_ref::<StoreError>() {
        e.messages()
    } else if let Some(e) = err.downcast_ref::<SchemaError>() {
        e.messages()
    } else {
        Vec::new()
    };

    if messages.len() > 1 || messages.first().is_some_and(|m| *m != err.to_string()) {
        for message in messages {
            eprintln!("   - {}", message);
        }
    }
}

fn cmd_validate_schema(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let doc: Value = serde_json::from_str(&content)?;
    let entries = doc.as_array().ok_or(SchemaError::NotAList)?;

    let diagnostics = validate(entries);
    if diagnostics.is_empty() {
        eprintln!("✅ {} entries, schema is valid", entries.len());
        return Ok(());
    }

    for diagnostic in &diagnostics {
        let key = entries[diagnostic.index]
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("?");
        eprintln!("\n❌ Entry {} ({}):", diagnostic.index + 1, key);
        for message in &diagnostic.messages {
            eprintln!("   - {}", message);
        }
    }

    eprintln!(
        "\n📊 Results: {} of {} entries invalid",
        diagnostics.len(),
        entries.len()
    );
    std::process::exit(1);
}

fn cmd_parse(
    input: &Path,
    delimiter: char,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let parsed = parse_csv_file_auto(input, delimiter_arg(delimiter)?)?;

    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("✅ Parsed {} rows, up to {} columns", parsed.rows.len(), parsed.column_count());

    let json = serde_json::to_string_pretty(&parsed.rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_decode(
    store: &DocumentStore,
    input: &Path,
    schemas: &SchemaArgs,
    delimiter: char,
    output: Option<&Path>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Decoding: {}", input.display());

    let (scene, object) = resolve_schemas(store, schemas)?;
    let parsed = parse_csv_file_auto(input, delimiter_arg(delimiter)?)?;

    let outcome = decode(&scene, &object, &parsed.rows, &DecodeOptions::default());
    if !outcome.is_ok() {
        eprintln!("\n❌ {}:", outcome.summary());
        for message in outcome.messages() {
            eprintln!("   - {}", message);
        }
        std::process::exit(1);
    }

    eprintln!("✅ {} scenes", outcome.scenes.len());

    if save {
        let saved = store.add_scenes(outcome.scenes.clone())?;
        for (i, s) in saved.iter().enumerate() {
            eprintln!("   💾 {} ({})", s.id, scene_label(&s.scene, i + 1));
        }
    }

    let json = serde_json::to_string_pretty(&outcome.scenes)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_convert(
    store: &DocumentStore,
    input: &Path,
    schemas: &SchemaArgs,
    delimiter: char,
    trial: &TrialArgs,
    out: &OutputArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let (scene, object) = resolve_schemas(store, schemas)?;
    let options = ConvertOptions {
        delimiter,
        trial: trial.options(),
        ..Default::default()
    };

    let result = convert_csv(input, &scene, &object, &options)?;

    eprintln!("   Encoding: {}", result.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.csv_info.delimiter));
    eprintln!("   Rows: {}", result.csv_info.row_count);
    eprintln!("\n⚙️  {} scenes → {} trials", result.scenes.len(), result.trial_file.trials.len());

    let json = serde_json::to_string_pretty(&result.trial_file)?;
    emit(store, &json, out, FormKind::Scene, "trial")?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_assemble(
    store: &DocumentStore,
    scenes_file: Option<&Path>,
    stored: &[String],
    trial: &TrialArgs,
    out: &OutputArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut scenes = store.get_scenes(stored)?;

    if let Some(path) = scenes_file {
        let content = fs::read_to_string(path)?;
        let from_file: Vec<SceneRecord> = serde_json::from_str(&content)?;
        eprintln!("📄 {} scenes from {}", from_file.len(), path.display());
        scenes.extend(from_file);
    }

    let trial_file = assemble_trials(&scenes, &trial.options())?;

    let json = serde_json::to_string_pretty(&trial_file)?;
    emit(store, &json, out, FormKind::Scene, "trial")?;

    Ok(())
}

fn cmd_config(
    store: &DocumentStore,
    values: Option<&Path>,
    schema: Option<&Path>,
    out: &OutputArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = match schema {
        Some(path) => load_schema(&fs::read_to_string(path)?)?,
        None => store.load_schema(FormKind::Config)?,
    };

    let values: Map<String, Value> = match values {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Map::new(),
    };

    let config = build_config_record(&schema, &values)?;
    eprintln!("✅ Configuration with {} fields", config.len());

    let json = serde_json::to_string_pretty(&config)?;
    emit(store, &json, out, FormKind::Config, "config")?;

    Ok(())
}

fn cmd_schema(store: &DocumentStore, action: SchemaAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SchemaAction::List => {
            for kind in FormKind::ALL {
                let form = store.load_form(kind)?;
                println!("  📋 {} ({} entries)", kind, form.entries.len());
                println!("     Keys: {}", form.entries.keys().join(", "));
                match form.updated_at {
                    Some(ref at) => println!("     Updated: {}", at),
                    None => println!("     Built-in default"),
                }
                if let Some(ref path) = form.output_path {
                    println!("     Output path: {}", path);
                }
                println!();
            }
        }

        SchemaAction::Show { kind } => {
            let form = store.load_form(kind)?;
            println!("{}", serde_json::to_string_pretty(&form)?);
        }

        SchemaAction::Import { kind, file } => {
            eprintln!("📥 Importing {} schema from: {}", kind, file.display());
            let schema = store.import_schema(kind, &file)?;
            eprintln!("✅ {} schema now has {} entries", kind, schema.len());
        }

        SchemaAction::Export { kind, output } => {
            let schema = store.load_schema(kind)?;
            let json = serde_json::to_string_pretty(&schema)?;
            write_output(&json, output.as_deref())?;
        }

        SchemaAction::Reset { kind } => {
            let schema = store.reset(kind)?;
            eprintln!("🔄 {} schema reset to default ({} entries)", kind, schema.len());
        }
    }

    Ok(())
}

fn cmd_scenes(store: &DocumentStore, action: ScenesAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScenesAction::List => {
            let scenes = store.list_scenes()?;
            if scenes.is_empty() {
                eprintln!("📋 No scenes saved yet.");
                eprintln!("   Use 'trialforge decode <csv> --save' or 'trialforge scenes add <file>'.");
                return Ok(());
            }

            eprintln!("📋 Saved scenes ({}):\n", scenes.len());
            for (i, s) in scenes.iter().enumerate() {
                println!("  🎬 {} ({})", scene_label(&s.scene, i + 1), s.id);
                println!("     Objects: {}", s.scene.objects.len());
                println!("     Saved: {}", s.saved_at);
            }
        }

        ScenesAction::Add { file } => {
            let content = fs::read_to_string(&file)?;
            let request: SceneRequest = serde_json::from_str(&content)?;

            let scene = build_scene(
                &store.load_schema(FormKind::Scene)?,
                &store.load_schema(FormKind::Object)?,
                &request.scene,
                &request.objects,
                &DecodeOptions::default(),
            )
            .map_err(PipelineError::Form)?;

            let saved = store.add_scene(scene)?;
            eprintln!("✅ Scene saved with ID: {}", saved.id);
        }

        ScenesAction::Delete { id } => {
            let removed = store.delete_scene(&id)?;
            eprintln!("🗑️  Scene deleted: {}", id);
            eprintln!("   Objects: {}", removed.scene.objects.len());
        }
    }

    Ok(())
}

async fn cmd_serve(store: DocumentStore, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = match port {
        Some(port) => port,
        None => match std::env::var("PORT") {
            Ok(value) => value.parse()?,
            Err(_) => DEFAULT_PORT,
        },
    };

    trialforge::server::start_server(port, store).await?;
    Ok(())
}

fn resolve_schemas(
    store: &DocumentStore,
    schemas: &SchemaArgs,
) -> Result<(FormSchema, FormSchema), Box<dyn std::error::Error>> {
    let scene = match schemas.scene_schema {
        Some(ref path) => load_schema(&fs::read_to_string(path)?)?,
        None => store.load_schema(FormKind::Scene)?,
    };
    let object = match schemas.object_schema {
        Some(ref path) => load_schema(&fs::read_to_string(path)?)?,
        None => store.load_schema(FormKind::Object)?,
    };
    Ok((scene, object))
}

fn scene_label(scene: &SceneRecord, n: usize) -> String {
    scene.display_name(&TrialOptions::default().scene_name_key, n)
}

fn delimiter_arg(delimiter: char) -> Result<u8, PipelineError> {
    trialforge::parser::delimiter_byte(delimiter).ok_or(PipelineError::InvalidDelimiter(delimiter))
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

/// Write to `--out-dir` (remembering it for `kind`), `-o`, or stdout
fn emit(
    store: &DocumentStore,
    content: &str,
    out: &OutputArgs,
    kind: FormKind,
    default_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match out.out_dir {
        Some(ref dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.json", out.name.as_deref().unwrap_or(default_name)));
            write_output(content, Some(&path))?;
            store.set_output_path(kind, &dir.to_string_lossy())?;
        }
        None => write_output(content, out.output.as_deref())?,
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
