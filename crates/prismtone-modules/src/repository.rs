//! User-authored module persistence.
//!
//! Each repository owns one directory and one writer thread. Saves are
//! queued and complete in submission order; listing and deletion run on
//! the caller's thread.

use std::fs;
use std::io::{ErrorKind, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

use crate::catalog::is_json_file;
use crate::info::{Document, ModuleKind};
use crate::validator::is_file_safe_id;

/// Prefix carried by every id the repositories generate.
pub const USER_ID_PREFIX: &str = "user_";

const MAX_ID_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("failed to write module: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize module: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("module document is not a JSON object")]
    NotAnObject,
    #[error("repository worker thread terminated")]
    WorkerExited,
}

/// Result of one queued save: the generated id or a readable reason.
pub type SaveOutcome = Result<String, String>;

type SuccessCallback = Box<dyn FnOnce(String) + Send>;
type ErrorCallback = Box<dyn FnOnce(String) + Send>;

enum Completion {
    Ticket(Sender<SaveOutcome>),
    Callbacks {
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    },
}

impl Completion {
    fn deliver(self, outcome: SaveOutcome) {
        match self {
            Completion::Ticket(reply) => {
                let _ = reply.send(outcome);
            }
            Completion::Callbacks {
                on_success,
                on_error,
            } => {
                let delivered = panic::catch_unwind(AssertUnwindSafe(move || match outcome {
                    Ok(id) => on_success(id),
                    Err(message) => on_error(message),
                }));
                if delivered.is_err() {
                    tracing::error!("save completion callback panicked");
                }
            }
        }
    }
}

enum RepositoryCommand {
    Save {
        document: Document,
        completion: Completion,
    },
    Shutdown,
}

/// Handle to a pending save.
pub struct SaveTicket {
    receiver: Receiver<SaveOutcome>,
}

impl SaveTicket {
    fn failed(message: String) -> Self {
        let (tx, rx) = unbounded();
        let _ = tx.send(Err(message));
        Self { receiver: rx }
    }

    /// Blocks until the worker reports the outcome.
    pub fn wait(self) -> SaveOutcome {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(RepositoryError::WorkerExited.to_string()))
    }

    /// Outcome if the worker already finished this save.
    pub fn try_outcome(&self) -> Option<SaveOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RepositoryError::WorkerExited.to_string())),
        }
    }
}

/// Directory of user documents with a single background writer.
pub struct ContentRepository {
    dir: PathBuf,
    commands: Sender<RepositoryCommand>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ContentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRepository")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl ContentRepository {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, RepositoryError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "content".into());
        let (tx, rx) = unbounded();
        let worker_dir = dir.clone();
        let last_stamp = highest_user_stamp(&dir);
        let handle = thread::Builder::new()
            .name(format!("prismtone-save-{name}"))
            .spawn(move || save_worker(worker_dir, last_stamp, rx))?;

        Ok(Self {
            dir,
            commands: tx,
            handle: Some(handle),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every readable document in the directory, in file-name order.
    pub fn list(&self) -> Vec<Document> {
        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !is_json_file(path) {
                continue;
            }
            match read_document(path) {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable user module");
                }
            }
        }
        documents
    }

    /// Queues `document` for writing; the ticket yields the assigned id.
    pub fn save(&self, document: Document) -> SaveTicket {
        let (tx, rx) = unbounded();
        let command = RepositoryCommand::Save {
            document,
            completion: Completion::Ticket(tx),
        };
        match self.commands.send(command) {
            Ok(()) => SaveTicket { receiver: rx },
            Err(_) => SaveTicket::failed(RepositoryError::WorkerExited.to_string()),
        }
    }

    /// Queues `document`; exactly one of the callbacks runs on the writer
    /// thread once the save completes.
    pub fn save_with<S, E>(&self, document: Document, on_success: S, on_error: E)
    where
        S: FnOnce(String) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let completion = Completion::Callbacks {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        };
        let command = RepositoryCommand::Save {
            document,
            completion,
        };
        if let Err(err) = self.commands.send(command) {
            if let RepositoryCommand::Save { completion, .. } = err.into_inner() {
                completion.deliver(Err(RepositoryError::WorkerExited.to_string()));
            }
        }
    }

    /// Removes a user document. Ids without the user prefix are refused.
    pub fn delete(&self, id: &str) -> bool {
        if !is_user_id(id) {
            tracing::warn!(%id, "refusing to delete non-user module");
            return false;
        }
        let path = self.dir.join(format!("{id}.json"));
        if !path.is_file() {
            return false;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(%id, path = %path.display(), "deleted user module");
                true
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "failed to delete user module");
                false
            }
        }
    }
}

impl Drop for ContentRepository {
    fn drop(&mut self) {
        let _ = self.commands.send(RepositoryCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn is_user_id(id: &str) -> bool {
    id.starts_with(USER_ID_PREFIX) && id.len() > USER_ID_PREFIX.len() && is_file_safe_id(id)
}

/// Largest stamp among the `user_<millis>.json` files already in `dir`.
fn highest_user_stamp(dir: &Path) -> i64 {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| is_json_file(entry.path()))
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()?
                .to_str()?
                .strip_prefix(USER_ID_PREFIX)?
                .parse::<i64>()
                .ok()
        })
        .max()
        .unwrap_or(0)
}

fn read_document(path: &Path) -> Result<Document, RepositoryError> {
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(document) => Ok(document),
        _ => Err(RepositoryError::NotAnObject),
    }
}

fn save_worker(dir: PathBuf, mut last_stamp: i64, receiver: Receiver<RepositoryCommand>) {
    while let Ok(command) = receiver.recv() {
        match command {
            RepositoryCommand::Shutdown => break,
            RepositoryCommand::Save {
                document,
                completion,
            } => {
                let outcome = save_document(&dir, &document, &mut last_stamp).map_err(|err| {
                    tracing::warn!(dir = %dir.display(), error = %err, "failed to save user module");
                    err.to_string()
                });
                completion.deliver(outcome);
            }
        }
    }
}

fn next_stamp(last: &mut i64) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    *last = if now > *last { now } else { *last + 1 };
    *last
}

/// Writes `document` under a fresh id, skipping stamps whose file exists.
fn save_document(
    dir: &Path,
    document: &Document,
    last_stamp: &mut i64,
) -> Result<String, RepositoryError> {
    let mut attempts = 1;
    loop {
        let stamp = next_stamp(last_stamp);
        match write_document(dir, document, stamp) {
            Err(RepositoryError::Io(err))
                if err.kind() == ErrorKind::AlreadyExists && attempts < MAX_ID_ATTEMPTS =>
            {
                tracing::debug!(stamp, "user module id taken, trying the next one");
                attempts += 1;
            }
            outcome => return outcome,
        }
    }
}

fn write_document(dir: &Path, document: &Document, stamp: i64) -> Result<String, RepositoryError> {
    let id = format!("{USER_ID_PREFIX}{stamp}");
    let mut document = document.clone();
    document.insert("id".into(), Value::String(id.clone()));
    let json = serde_json::to_string_pretty(&Value::Object(document))?;
    let path = dir.join(format!("{id}.json"));
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    file.write_all(json.as_bytes())?;
    tracing::info!(%id, path = %path.display(), "saved user module");
    Ok(id)
}

/// One repository per persisted module kind under a shared user root.
#[derive(Debug)]
pub struct UserRepositories {
    pub sound_presets: ContentRepository,
    pub fx_chains: ContentRepository,
    pub chord_progressions: ContentRepository,
}

impl UserRepositories {
    pub fn open<P: AsRef<Path>>(user_root: P) -> Result<Self, RepositoryError> {
        let root = user_root.as_ref();
        Ok(Self {
            sound_presets: ContentRepository::open(root.join(ModuleKind::SoundPreset.as_str()))?,
            fx_chains: ContentRepository::open(root.join(ModuleKind::FxChain.as_str()))?,
            chord_progressions: ContentRepository::open(
                root.join(ModuleKind::ChordProgression.as_str()),
            )?,
        })
    }

    /// Repository for `kind`, when that kind is persisted.
    pub fn for_kind(&self, kind: ModuleKind) -> Option<&ContentRepository> {
        match kind {
            ModuleKind::SoundPreset => Some(&self.sound_presets),
            ModuleKind::FxChain => Some(&self.fx_chains),
            ModuleKind::ChordProgression => Some(&self.chord_progressions),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn stamps_strictly_increase() {
        let mut last = i64::MAX - 10;
        let first = next_stamp(&mut last);
        let second = next_stamp(&mut last);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn user_ids_are_recognised() {
        assert!(is_user_id("user_1700000000000"));
        assert!(!is_user_id("user_"));
        assert!(!is_user_id("default_piano"));
        assert!(!is_user_id("user_../settings"));
        assert!(!is_user_id("user_a/b"));
    }

    #[test]
    fn save_then_list_includes_assigned_id() {
        let dir = tempdir().unwrap();
        let repo = ContentRepository::open(dir.path().join("soundpreset")).unwrap();
        let original = document(json!({
            "type": "soundpreset",
            "name": "Pad",
            "data": { "envelope": { "attack": 0.2 } }
        }));
        let id = repo.save(original.clone()).wait().unwrap();
        assert!(id.starts_with(USER_ID_PREFIX));

        let mut expected = original;
        expected.insert("id".into(), json!(id));
        assert_eq!(repo.list(), vec![expected]);
    }

    #[test]
    fn existing_files_are_never_overwritten() {
        let dir = tempdir().unwrap();
        let far_future = "user_99999999999999.json";
        fs::write(dir.path().join(far_future), r#"{ "name": "Keep" }"#).unwrap();

        let repo = ContentRepository::open(dir.path()).unwrap();
        let id = repo.save(document(json!({ "name": "New" }))).wait().unwrap();
        assert_eq!(id, "user_100000000000000");
        let kept = fs::read_to_string(dir.path().join(far_future)).unwrap();
        assert_eq!(kept, r#"{ "name": "Keep" }"#);
    }

    #[test]
    fn taken_stamps_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("user_99999999999990.json"), "{}").unwrap();
        let doc = document(json!({ "name": "Next" }));

        assert!(matches!(
            write_document(dir.path(), &doc, 99_999_999_999_990),
            Err(RepositoryError::Io(err)) if err.kind() == ErrorKind::AlreadyExists
        ));

        let mut last = 99_999_999_999_989;
        let id = save_document(dir.path(), &doc, &mut last).unwrap();
        assert_eq!(id, "user_99999999999991");
        assert_eq!(fs::read_to_string(dir.path().join("user_99999999999990.json")).unwrap(), "{}");
    }

    #[test]
    fn list_matches_extension_case_insensitively() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("user_1.JSON"), r#"{ "name": "Upper" }"#).unwrap();
        fs::write(dir.path().join("user_2.json"), r#"{ "name": "Lower" }"#).unwrap();
        let repo = ContentRepository::open(dir.path()).unwrap();
        let names: Vec<_> = repo.list().iter().map(|doc| doc["name"].clone()).collect();
        assert_eq!(names, vec![json!("Upper"), json!("Lower")]);
    }

    #[test]
    fn callbacks_receive_the_id() {
        let dir = tempdir().unwrap();
        let repo = ContentRepository::open(dir.path()).unwrap();
        let (tx, rx) = unbounded();
        let err_tx = tx.clone();
        repo.save_with(
            document(json!({ "name": "Chain" })),
            move |id| {
                let _ = tx.send(Ok(id));
            },
            move |message| {
                let _ = err_tx.send(Err(message));
            },
        );
        let outcome: SaveOutcome = rx.recv().unwrap();
        let id = outcome.unwrap();
        assert!(dir.path().join(format!("{id}.json")).is_file());
    }

    #[test]
    fn write_failure_reaches_the_caller() {
        let dir = tempdir().unwrap();
        let repo_dir = dir.path().join("fxchain");
        let repo = ContentRepository::open(&repo_dir).unwrap();
        fs::remove_dir_all(&repo_dir).unwrap();
        let outcome = repo.save(document(json!({ "name": "Lost" }))).wait();
        assert!(outcome.unwrap_err().starts_with("failed to write module"));
    }

    #[test]
    fn user_repositories_use_type_directories() {
        let dir = tempdir().unwrap();
        let repos = UserRepositories::open(dir.path()).unwrap();
        assert_eq!(repos.fx_chains.dir(), dir.path().join("fxchain"));
        assert!(dir.path().join("chordProgression").is_dir());
        assert!(repos.for_kind(ModuleKind::Theme).is_none());
    }
}
