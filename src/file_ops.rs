//! File and folder operations rooted at a base directory.
//!
//! Every operation resolves its arguments against the base directory (absolute
//! arguments are used as-is), checks that the source exists and that the target
//! is free, and only then calls into the OS. Collisions are reported as
//! [`FileOpError::AlreadyExists`] unless the manager was built with `force`.
use crate::output::OutputFormatter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Folders with more entries than this show a progress bar while zipping.
const ARCHIVE_PROGRESS_THRESHOLD: usize = 64;

/// Errors that can occur during file operations.
#[derive(Debug, Error)]
pub enum FileOpError {
    /// The source path does not exist.
    #[error("'{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    /// The target path is already taken.
    #[error("'{}' already exists (use --force to overwrite)", path.display())]
    AlreadyExists { path: PathBuf },

    /// The operation needs a folder but got something else.
    #[error("'{}' is not a folder", path.display())]
    NotADirectory { path: PathBuf },

    /// A folder would be copied or moved into its own tree.
    #[error("Cannot put '{}' inside itself at '{}'", folder.display(), target.display())]
    IntoItself { folder: PathBuf, target: PathBuf },

    /// The OS call itself failed.
    #[error("{action} failed for {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the zip archive failed.
    #[error("Failed to write archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl FileOpError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| FileOpError::Io {
            action,
            path,
            source,
        }
    }

    /// Returns true for failures that may succeed when tried again.
    ///
    /// Missing sources and taken targets are facts about the file system and
    /// will not change by retrying the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, FileOpError::Io { .. } | FileOpError::Archive { .. })
    }
}

/// Result type for file operations.
pub type FileOpResult<T> = Result<T, FileOpError>;

/// A file ready to be attached to an email.
///
/// Folders are zipped into the temp directory first; that archive is removed
/// again when the attachment is dropped.
#[derive(Debug)]
pub struct PreparedAttachment {
    path: PathBuf,
    temporary: bool,
}

impl PreparedAttachment {
    /// The file to attach.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PreparedAttachment {
    fn drop(&mut self) {
        if self.temporary
            && let Err(e) = fs::remove_file(&self.path)
        {
            tracing::debug!(
                path = %self.path.display(),
                error = %e,
                "Could not remove temporary archive"
            );
        }
    }
}

/// Performs file operations relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
    force: bool,
}

impl FileManager {
    /// Creates a manager rooted at `base_dir` that refuses to overwrite.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            force: false,
        }
    }

    /// Allows operations to replace an existing target.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The directory relative names are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves a name against the base directory.
    ///
    /// A leading `~/` is dropped so that `~/archive` and `archive` mean the
    /// same thing when the base is the home directory.
    pub fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        match name.strip_prefix("~") {
            Ok(rest) => self.base_dir.join(rest),
            Err(_) => self.base_dir.join(name),
        }
    }

    /// Creates a file with optional content.
    ///
    /// Every character in `chars_to_strip` is removed from the content before
    /// it is written. Missing parent folders are created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use watchzone::file_ops::FileManager;
    ///
    /// let files = FileManager::new("/home/me/WatchZone");
    /// let path = files.create_file("notes.txt", Some("Hello, world!"), Some("lo")).unwrap();
    /// assert_eq!(std::fs::read_to_string(path).unwrap(), "He, wrd!");
    /// ```
    pub fn create_file(
        &self,
        name: &str,
        content: Option<&str>,
        chars_to_strip: Option<&str>,
    ) -> FileOpResult<PathBuf> {
        let path = self.resolve(name);
        self.ensure_target_free(&path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(FileOpError::io("create folder", parent))?;
        }

        let content = content.unwrap_or_default();
        let content: String = match chars_to_strip {
            Some(strip) => content.chars().filter(|c| !strip.contains(*c)).collect(),
            None => content.to_string(),
        };

        // create_new closes the gap between the existence check and the write
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => FileOpError::AlreadyExists { path: path.clone() },
                _ => FileOpError::Io {
                    action: "create file",
                    path: path.clone(),
                    source: e,
                },
            })?;
        file.write_all(content.as_bytes())
            .map_err(FileOpError::io("write file", &path))?;

        Ok(path)
    }

    /// Creates a folder (and any missing parents).
    pub fn create_folder(&self, name: &str) -> FileOpResult<PathBuf> {
        let path = self.resolve(name);
        if exists(&path) {
            return Err(FileOpError::AlreadyExists { path });
        }
        fs::create_dir_all(&path).map_err(FileOpError::io("create folder", &path))?;
        Ok(path)
    }

    /// Makes sure a folder exists, creating it if needed.
    ///
    /// Unlike [`FileManager::create_folder`] an existing folder is not an
    /// error, including one created concurrently by another process.
    pub fn ensure_folder(&self, name: &str) -> FileOpResult<PathBuf> {
        let path = self.resolve(name);
        if let Err(e) = fs::create_dir_all(&path)
            && !path.is_dir()
        {
            return Err(match e.kind() {
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
                    FileOpError::NotADirectory { path }
                }
                _ => FileOpError::Io {
                    action: "create folder",
                    path,
                    source: e,
                },
            });
        }
        if !path.is_dir() {
            return Err(FileOpError::NotADirectory { path });
        }
        Ok(path)
    }

    /// Moves a file or folder.
    ///
    /// When `destination` is an existing folder the source lands inside it
    /// under its own name. Returns the final path.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the source is missing
    /// * `AlreadyExists` if the final path is taken and `force` is off
    /// * `IntoItself` if a folder would land inside its own tree
    pub fn move_entry(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> FileOpResult<PathBuf> {
        let source = self.existing(source)?;
        let target = self.target_for(&source, destination.as_ref());
        ensure_not_inside(&source, &target)?;
        self.ensure_target_free(&target)?;

        match fs::rename(&source, &target) {
            Ok(()) => Ok(target),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                copy_then_remove(&source, &target)?;
                Ok(target)
            }
            Err(e) => Err(FileOpError::Io {
                action: "move",
                path: source,
                source: e,
            }),
        }
    }

    /// Renames a file or folder. `new` is the full new path, never a folder to
    /// move into.
    pub fn rename(&self, old: impl AsRef<Path>, new: impl AsRef<Path>) -> FileOpResult<PathBuf> {
        let source = self.existing(old)?;
        let target = self.resolve(new);
        self.ensure_target_free(&target)?;
        fs::rename(&source, &target).map_err(FileOpError::io("rename", &source))?;
        Ok(target)
    }

    /// Copies a file or a whole folder tree.
    ///
    /// A folder is never copied into itself or one of its subfolders; that is
    /// rejected with `IntoItself` before anything is written.
    pub fn copy(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> FileOpResult<PathBuf> {
        let source = self.existing(source)?;
        let target = self.target_for(&source, destination.as_ref());
        ensure_not_inside(&source, &target)?;
        self.ensure_target_free(&target)?;
        copy_recursive(&source, &target)?;
        Ok(target)
    }

    /// Deletes a file, or a folder with everything in it.
    pub fn delete(&self, name: impl AsRef<Path>) -> FileOpResult<()> {
        let path = self.existing(name)?;
        remove_entry(&path)
    }

    /// Returns the contents of a file or the listing of a folder.
    ///
    /// Folder listings are sorted and newline-joined. Files that are not valid
    /// UTF-8 are described rather than dumped.
    pub fn view(&self, name: impl AsRef<Path>) -> FileOpResult<String> {
        let path = self.existing(name)?;

        if path.is_file() {
            let bytes = fs::read(&path).map_err(FileOpError::io("read file", &path))?;
            return Ok(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    let bytes = e.into_bytes();
                    let mime = infer::get(&bytes)
                        .map(|kind| kind.mime_type())
                        .unwrap_or("application/octet-stream");
                    format!("<binary file: {}, {} bytes>", mime, bytes.len())
                }
            });
        }

        if path.is_dir() {
            let mut names: Vec<String> = fs::read_dir(&path)
                .map_err(FileOpError::io("list folder", &path))?
                .flatten()
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            return Ok(names.join("\n"));
        }

        Ok(format!(
            "{} exists but is not a regular file or folder.",
            path.display()
        ))
    }

    /// Zips a folder and returns the path of the archive.
    ///
    /// The archive defaults to `<folder>.zip` next to the folder. Entries are
    /// stored relative to the folder itself, so extracting the archive
    /// reproduces the folder's contents.
    pub fn archive(
        &self,
        folder: impl AsRef<Path>,
        output: Option<&str>,
    ) -> FileOpResult<PathBuf> {
        let folder_path = self.existing(folder)?;
        if !folder_path.is_dir() {
            return Err(FileOpError::NotADirectory { path: folder_path });
        }

        let zip_path = match output {
            Some(output) => self.resolve(output),
            None => sibling_zip_path(&folder_path),
        };
        self.ensure_target_free(&zip_path)?;

        if let Err(e) = write_zip(&folder_path, &zip_path) {
            let _ = fs::remove_file(&zip_path);
            return Err(e);
        }
        Ok(zip_path)
    }

    /// Prepares a file or folder for sending as an email attachment.
    pub fn attachment_for(&self, name: impl AsRef<Path>) -> FileOpResult<PreparedAttachment> {
        let path = self.existing(name)?;
        if !path.is_dir() {
            return Ok(PreparedAttachment {
                path,
                temporary: false,
            });
        }

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let zip_name = format!("watchzone-{}-{}", stamp, zip_file_name(&path));
        let zip_path = std::env::temp_dir().join(zip_name);
        if let Err(e) = write_zip(&path, &zip_path) {
            let _ = fs::remove_file(&zip_path);
            return Err(e);
        }
        Ok(PreparedAttachment {
            path: zip_path,
            temporary: true,
        })
    }

    fn existing(&self, name: impl AsRef<Path>) -> FileOpResult<PathBuf> {
        let path = self.resolve(name);
        if !exists(&path) {
            return Err(FileOpError::NotFound { path });
        }
        Ok(path)
    }

    fn target_for(&self, source: &Path, destination: &Path) -> PathBuf {
        let target = self.resolve(destination);
        match source.file_name() {
            Some(name) if target.is_dir() => target.join(name),
            _ => target,
        }
    }

    fn ensure_target_free(&self, target: &Path) -> FileOpResult<()> {
        if !exists(target) {
            return Ok(());
        }
        if !self.force {
            return Err(FileOpError::AlreadyExists {
                path: target.to_path_buf(),
            });
        }
        tracing::debug!(path = %target.display(), "Replacing existing entry");
        remove_entry(target)
    }
}

/// True if something (even a dangling symlink) sits at `path`.
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Returns true if `path`, read relative to the base, could point outside it.
///
/// That is any `..` component, or an absolute or drive-prefixed path. A
/// leading `~` stands for the base itself and is not counted.
pub fn escapes_base(path: &Path) -> bool {
    let path = path.strip_prefix("~").unwrap_or(path);
    path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// True if `target` lies inside the folder `folder` (or is the folder).
fn is_within(target: &Path, folder: &Path) -> bool {
    if target.starts_with(folder) {
        return true;
    }
    // Catches symlinked or `./`-style spellings of the same folder
    match (
        target.parent().map(fs::canonicalize),
        fs::canonicalize(folder),
    ) {
        (Some(Ok(parent)), Ok(folder)) => parent.starts_with(folder),
        _ => false,
    }
}

fn ensure_not_inside(source: &Path, target: &Path) -> FileOpResult<()> {
    if source.is_dir() && is_within(target, source) {
        return Err(FileOpError::IntoItself {
            folder: source.to_path_buf(),
            target: target.to_path_buf(),
        });
    }
    Ok(())
}

fn remove_entry(path: &Path) -> FileOpResult<()> {
    let is_dir = fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if is_dir {
        fs::remove_dir_all(path).map_err(FileOpError::io("delete folder", path))
    } else {
        fs::remove_file(path).map_err(FileOpError::io("delete file", path))
    }
}

/// Copies `source` to `target`, then removes `source`.
///
/// A failed copy removes whatever part of `target` was written, so the same
/// target can be tried again.
fn copy_then_remove(source: &Path, target: &Path) -> FileOpResult<()> {
    if let Err(e) = copy_recursive(source, target) {
        if exists(target)
            && let Err(cleanup) = remove_entry(target)
        {
            tracing::warn!(
                path = %target.display(),
                error = %cleanup,
                "Could not remove partial copy"
            );
        }
        return Err(e);
    }
    remove_entry(source)
}

fn copy_recursive(source: &Path, target: &Path) -> FileOpResult<()> {
    if !source.is_dir() {
        fs::copy(source, target).map_err(FileOpError::io("copy", source))?;
        return Ok(());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| FileOpError::Io {
            action: "walk folder",
            path: source.to_path_buf(),
            source: e.into(),
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(FileOpError::io("create folder", &dest))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(FileOpError::io("copy", entry.path()))?;
        }
    }
    Ok(())
}

fn zip_file_name(folder: &Path) -> String {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    format!("{}.zip", name)
}

fn sibling_zip_path(folder: &Path) -> PathBuf {
    folder.with_file_name(zip_file_name(folder))
}

/// Converts a relative path to a zip entry name (always `/`-separated).
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn write_zip(folder: &Path, zip_path: &Path) -> FileOpResult<()> {
    let entries: Vec<walkdir::DirEntry> = WalkDir::new(folder)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<_, _>>()
        .map_err(|e| FileOpError::Io {
            action: "walk folder",
            path: folder.to_path_buf(),
            source: e.into(),
        })?;

    let file = File::create(zip_path).map_err(FileOpError::io("create archive", zip_path))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |source| FileOpError::Archive {
        path: zip_path.to_path_buf(),
        source,
    };

    let progress = (entries.len() > ARCHIVE_PROGRESS_THRESHOLD)
        .then(|| OutputFormatter::create_progress_bar(entries.len() as u64, "zipping"));

    for entry in &entries {
        // An explicit --output inside the folder must not archive itself
        if entry.path() == zip_path {
            continue;
        }
        let relative = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_err)?;
        } else {
            zip.start_file(name, options).map_err(zip_err)?;
            let mut input =
                File::open(entry.path()).map_err(FileOpError::io("read file", entry.path()))?;
            io::copy(&mut input, &mut zip).map_err(FileOpError::io("compress", entry.path()))?;
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    zip.finish().map_err(zip_err)?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(())
}
