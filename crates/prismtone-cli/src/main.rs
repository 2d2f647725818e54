use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use prismtone_modules::{
    Document, JsonSettingsStore, LanguageView, Localizer, ModuleCatalog, ModuleKind,
    ModuleLoader, ModuleUpdater, SettingsStore, StoreConfig, UserRepositories,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = cli.stores.config();
    match cli.command {
        Commands::Scan => execute_scan(&config),
        Commands::List { module_type } => execute_list(&config, &module_type),
        Commands::Defaults => execute_defaults(&config, cli.stores.settings.as_deref()),
        Commands::View { module_type, id } => execute_view(&config, &module_type, &id),
        Commands::Translate { key, language } => {
            execute_translate(&config, cli.stores.settings.as_deref(), &key, language.as_deref())
        }
        Commands::Save { module_type, file } => execute_save(&config, &module_type, &file),
        Commands::Update {
            module_type,
            id,
            file,
        } => execute_update(&config, &module_type, &id, &file),
        Commands::UserList { module_type } => execute_user_list(&config, &module_type),
        Commands::Delete { module_type, id } => execute_delete(&config, &module_type, &id),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Content module tools for Prismtone")]
struct Cli {
    #[command(flatten)]
    stores: StoreArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Root of the bundled module store.
    #[arg(long, global = true, value_name = "DIR")]
    content: Option<PathBuf>,
    /// Root of the user module store.
    #[arg(long, global = true, value_name = "DIR")]
    user: Option<PathBuf>,
    /// Root of the store holding updated versions of catalog modules.
    #[arg(long, global = true, value_name = "DIR")]
    overrides: Option<PathBuf>,
    /// Settings file to read and update.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::default();
        if let Some(content) = &self.content {
            config.bundled_root = content.clone();
        }
        if let Some(user) = &self.user {
            config.user_root = user.clone();
        }
        if let Some(overrides) = &self.overrides {
            config.override_root = overrides.clone();
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan both stores and report what was admitted or skipped.
    Scan,
    /// Print the catalog entries of one module type as JSON.
    List { module_type: String },
    /// Resolve the default module of every selectable type and store it.
    Defaults,
    /// Load a module's typed view and print its values.
    View { module_type: String, id: String },
    /// Look up a localized string.
    Translate {
        key: String,
        /// Language module to use instead of the stored selection.
        #[arg(long)]
        language: Option<String>,
    },
    /// Persist a new user module from a JSON file.
    Save { module_type: String, file: PathBuf },
    /// Write a newer version of an existing module into the override store.
    Update {
        module_type: String,
        id: String,
        file: PathBuf,
    },
    /// List the user documents of a persisted type.
    UserList { module_type: String },
    /// Delete a user document.
    Delete { module_type: String, id: String },
}

fn scanned_catalog(config: &StoreConfig) -> ModuleCatalog {
    let catalog = ModuleCatalog::with_builtin_types(&config.bundled_root);
    catalog.scan_all(config);
    catalog
}

fn execute_scan(config: &StoreConfig) -> Result<()> {
    let catalog = ModuleCatalog::with_builtin_types(&config.bundled_root);
    let report = catalog.scan_all(config);
    for (module_type, count) in catalog.summary() {
        println!("{module_type:<18} {count}");
    }
    println!(
        "admitted {} ({} replaced), skipped {}",
        report.admitted(),
        report.replaced,
        report.skipped.len()
    );
    for issue in &report.skipped {
        println!("  {}: {}", issue.path.display(), issue.error);
    }
    Ok(())
}

fn execute_list(config: &StoreConfig, module_type: &str) -> Result<()> {
    let modules = scanned_catalog(config).get_modules(module_type);
    println!("{}", serde_json::to_string_pretty(&modules)?);
    Ok(())
}

fn settings_store(path: Option<&Path>) -> Result<JsonSettingsStore> {
    match path {
        Some(path) => Ok(JsonSettingsStore::new(path)),
        None => JsonSettingsStore::open_default().context("failed to locate settings file"),
    }
}

fn execute_defaults(config: &StoreConfig, settings_path: Option<&Path>) -> Result<()> {
    let catalog = scanned_catalog(config);
    let store = settings_store(settings_path)?;
    let mut settings = store
        .load_settings()
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    let selections = catalog.apply_defaults(&mut settings);
    store
        .save_settings(&settings)
        .with_context(|| format!("failed to save {}", store.path().display()))?;
    for (kind, selected) in selections {
        println!("{:<18} {}", kind.as_str(), selected.as_deref().unwrap_or("-"));
    }
    Ok(())
}

fn execute_view(config: &StoreConfig, module_type: &str, id: &str) -> Result<()> {
    let catalog = scanned_catalog(config);
    let info = catalog
        .find(module_type, id)
        .ok_or_else(|| anyhow!("no {module_type} module with id `{id}`"))?;
    let mut loader = ModuleLoader::new(catalog.registry());
    let view = loader
        .load(&info)
        .with_context(|| format!("no view available for {module_type}/{id}"))?;
    println!("{}", serde_json::to_string_pretty(&view.values())?);
    Ok(())
}

fn execute_translate(
    config: &StoreConfig,
    settings_path: Option<&Path>,
    key: &str,
    language: Option<&str>,
) -> Result<()> {
    let catalog = scanned_catalog(config);
    let mut loader = ModuleLoader::new(catalog.registry());
    let mut localizer = Localizer::new();
    for info in catalog.get_modules(ModuleKind::Language.as_str()) {
        if let Err(err) = loader.load(&info) {
            tracing::warn!(id = %info.id, error = %err, "skipping language module");
            continue;
        }
        if let Some(view) = loader.get_as::<LanguageView>(&info.id) {
            localizer.register_view(view);
        }
    }

    let language = match language {
        Some(language) => language.to_owned(),
        None => settings_store(settings_path)
            .and_then(|store| Ok(store.load_settings()?))
            .map(|settings| settings.language)
            .unwrap_or_else(|_| localizer.current_language().to_owned()),
    };
    localizer.set_current_language(&language);
    println!("{}", localizer.get(key));
    Ok(())
}

fn persisted_kind(module_type: &str) -> Result<ModuleKind> {
    let kind = ModuleKind::from_tag(module_type)
        .ok_or_else(|| anyhow!("unknown module type `{module_type}`"))?;
    if !ModuleKind::PERSISTED.contains(&kind) {
        bail!("{module_type} modules cannot be stored by users");
    }
    Ok(kind)
}

fn read_document(file: &Path) -> Result<Document> {
    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", file.display()))?;
    match value {
        Value::Object(document) => Ok(document),
        _ => bail!("{} does not contain a JSON object", file.display()),
    }
}

fn execute_save(config: &StoreConfig, module_type: &str, file: &Path) -> Result<()> {
    let kind = persisted_kind(module_type)?;
    let document = read_document(file)?;
    let repositories =
        UserRepositories::open(&config.user_root).context("failed to open user store")?;
    let repository = repositories
        .for_kind(kind)
        .ok_or_else(|| anyhow!("{module_type} has no user repository"))?;
    let id = repository
        .save(document)
        .wait()
        .map_err(|message| anyhow!(message))
        .context("save failed")?;
    println!("{id}");
    Ok(())
}

fn execute_update(config: &StoreConfig, module_type: &str, id: &str, file: &Path) -> Result<()> {
    let catalog = scanned_catalog(config);
    let current = catalog
        .find(module_type, id)
        .ok_or_else(|| anyhow!("no {module_type} module with id `{id}`"))?;
    let replacement = read_document(file)?;
    let path = ModuleUpdater::new(&config.override_root)
        .update_module(&current, &replacement)
        .with_context(|| format!("failed to update {module_type}/{id}"))?;
    println!("{}", path.display());
    Ok(())
}

fn execute_user_list(config: &StoreConfig, module_type: &str) -> Result<()> {
    let kind = persisted_kind(module_type)?;
    let repositories =
        UserRepositories::open(&config.user_root).context("failed to open user store")?;
    let documents = repositories
        .for_kind(kind)
        .map(|repository| repository.list())
        .unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&documents)?);
    Ok(())
}

fn execute_delete(config: &StoreConfig, module_type: &str, id: &str) -> Result<()> {
    let kind = persisted_kind(module_type)?;
    let repositories =
        UserRepositories::open(&config.user_root).context("failed to open user store")?;
    let deleted = repositories
        .for_kind(kind)
        .is_some_and(|repository| repository.delete(id));
    if !deleted {
        bail!("{module_type}/{id} was not deleted");
    }
    println!("deleted {id}");
    Ok(())
}
