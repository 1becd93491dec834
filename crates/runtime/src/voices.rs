//! Voice registry: discovers voices under the voices root and resolves client
//! references to them.
//!
//! Layout:
//!
//! ```text
//! voices/
//!   my_voice/
//!     prompt.wav        # required, first audio file by extension priority
//!     my_voice.pth      # optional conversion model
//!     added.index       # optional feature index
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use vc_core::{VcError, VcResult, VoiceRecord, VoiceRef};

/// Prompt asset extensions, highest priority first.
pub const PROMPT_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac"];

/// Conversion model extensions.
pub const MODEL_EXTENSIONS: &[&str] = &["pth"];

/// Feature index extensions, highest priority first.
pub const INDEX_EXTENSIONS: &[&str] = &["index", "faiss", "idx"];

#[derive(Debug)]
struct Listing {
    scanned_at: Instant,
    voices: Arc<[VoiceRecord]>,
}

/// Registry of installed voices.
///
/// The listing is cached for `ttl`; additions and removals show up once it
/// expires, or immediately for a name that misses the cached listing.
#[derive(Debug)]
pub struct VoiceRegistry {
    root: PathBuf,
    ttl: Duration,
    listing: RwLock<Option<Listing>>,
}

impl VoiceRegistry {
    /// Create a registry over `root`. A zero `ttl` rescans on every call.
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            listing: RwLock::new(None),
        }
    }

    /// The voices root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Voices sorted by name. Served from the cached listing while it is fresh.
    pub fn list(&self) -> VcResult<Arc<[VoiceRecord]>> {
        if let Some(listing) = self.listing.read().as_ref() {
            if listing.scanned_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&listing.voices));
            }
        }
        self.rescan()
    }

    /// Scan the voices root now and replace the cached listing.
    pub fn rescan(&self) -> VcResult<Arc<[VoiceRecord]>> {
        let voices: Arc<[VoiceRecord]> = scan(&self.root)?.into();
        debug!(root = %self.root.display(), count = voices.len(), "scanned voices");

        *self.listing.write() = Some(Listing {
            scanned_at: Instant::now(),
            voices: Arc::clone(&voices),
        });
        Ok(voices)
    }

    /// Resolve a parsed reference to an installed voice.
    pub fn resolve(&self, voice: &VoiceRef) -> VcResult<VoiceRecord> {
        match voice {
            VoiceRef::Random => {
                let voices = self.list()?;
                voices
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .ok_or_else(|| {
                        VcError::not_found(format!("no voices found in {}", self.root.display()))
                    })
            }
            VoiceRef::ByName(name) => {
                if let Some(found) = find(&self.list()?, name) {
                    return Ok(found);
                }
                // The cached listing may predate the voice.
                find(&self.rescan()?, name).ok_or_else(|| {
                    VcError::not_found(format!(
                        "voice '{name}' not found under {}",
                        self.root.display()
                    ))
                })
            }
        }
    }

    /// Parse and resolve a raw client reference.
    pub fn resolve_str(&self, reference: &str) -> VcResult<VoiceRecord> {
        self.resolve(&VoiceRef::parse(reference)?)
    }
}

fn find(voices: &[VoiceRecord], name: &str) -> Option<VoiceRecord> {
    let name = name.trim();
    voices
        .iter()
        .find(|v| v.name().eq_ignore_ascii_case(name))
        .cloned()
}

fn scan(root: &Path) -> VcResult<Vec<VoiceRecord>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut voices = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };
        let files = files_in(&dir)?;

        let Some(prompt) = first_with_extension(&files, PROMPT_EXTENSIONS) else {
            info!(voice = %name, "skipping voice folder without a prompt asset");
            continue;
        };

        let mut voice = VoiceRecord::new(name, prompt);
        if let Some(model) = first_with_extension(&files, MODEL_EXTENSIONS) {
            voice = voice.with_conversion(model, first_with_extension(&files, INDEX_EXTENSIONS));
        }
        voices.push(voice);
    }

    Ok(voices)
}

/// Regular files in `dir`, sorted by name.
fn files_in(dir: &Path) -> VcResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn first_with_extension(files: &[PathBuf], extensions: &[&str]) -> Option<PathBuf> {
    extensions.iter().find_map(|ext| {
        files
            .iter()
            .find(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            })
            .cloned()
    })
}
