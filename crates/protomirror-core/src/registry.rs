//! File registry.
//!
//! [`Files`] indexes file descriptors by package and by path. Full names
//! are resolved through a trie of package segments: each node holds the
//! files of one package, and its children are either sub-packages or the
//! names the package's files declare at top level.
//!
//! Registration is atomic per file: a file whose names collide with what
//! is already registered is rejected without touching the registry.

use crate::descriptor::{Descriptor, FileDescriptor, MessageDescriptor};
use crate::error::{Error, NotFound, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

/// Configuration for a [`Files`] registry
#[derive(Debug, Clone, Default)]
pub struct FilesConfig {
    /// Reject placeholder files instead of skipping them
    pub reject_placeholders: bool,
}

impl FilesConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether placeholder files are rejected
    pub fn reject_placeholders(mut self, reject: bool) -> Self {
        self.reject_placeholders = reject;
        self
    }
}

#[derive(Debug, Default)]
struct PackageNode {
    files: Vec<Arc<FileDescriptor>>,
    children: HashMap<String, Entry>,
}

#[derive(Debug)]
enum Entry {
    Package(PackageNode),
    Declaration,
}

impl PackageNode {
    fn walk(&self, package: &str) -> Option<&PackageNode> {
        let mut node = self;
        for segment in segments(package) {
            match node.children.get(segment)? {
                Entry::Package(child) => node = child,
                Entry::Declaration => return None,
            }
        }
        Some(node)
    }

    fn visit<F>(&self, f: &mut F) -> bool
    where
        F: FnMut(&Arc<FileDescriptor>) -> bool,
    {
        for file in &self.files {
            if !f(file) {
                return false;
            }
        }
        for entry in self.children.values() {
            if let Entry::Package(child) = entry {
                if !child.visit(f) {
                    return false;
                }
            }
        }
        true
    }
}

/// Registry of file descriptors
#[derive(Debug, Default)]
pub struct Files {
    config: FilesConfig,
    root: PackageNode,
    files: Vec<Arc<FileDescriptor>>,
    by_path: HashMap<String, Vec<Arc<FileDescriptor>>>,
}

impl Files {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with the given configuration
    pub fn with_config(config: FilesConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builds a registry from files, keeping the first of any conflicting
    /// declarations. Rejected files are logged.
    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<FileDescriptor>>,
    {
        let mut registry = Self::new();
        for file in files {
            if let Err(err) = registry.register_one(file.into()) {
                warn!(error = %err, "Skipping file");
            }
        }
        registry
    }

    /// Number of registered files
    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// Registers files.
    ///
    /// Each file is checked against the registry before anything is
    /// inserted, so a rejected file leaves no trace. Later files are still
    /// registered after a rejection; the first error is returned.
    pub fn register<I>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Arc<FileDescriptor>>,
    {
        let mut first_error = None;
        for file in files {
            if let Err(err) = self.register_one(file.into()) {
                warn!(error = %err, "Rejected file");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn register_one(&mut self, file: Arc<FileDescriptor>) -> Result<()> {
        if file.is_placeholder() {
            if self.config.reject_placeholders {
                return Err(Error::PlaceholderFile {
                    path: file.path().to_string(),
                });
            }
            debug!(path = file.path(), "Skipping placeholder file");
            return Ok(());
        }

        self.check(&file)?;
        self.insert(Arc::clone(&file));
        debug!(
            path = file.path(),
            package = file.package(),
            declarations = file.num_declarations(),
            "Registered file"
        );
        Ok(())
    }

    /// Finds the first name of `file` that is already taken
    fn check(&self, file: &FileDescriptor) -> Result<()> {
        let package = file.package();
        let conflict = |name: &str| Error::name_conflict(file.path(), name);

        let mut node = &self.root;
        let mut walked = 0;
        for segment in segments(package) {
            walked += segment.len() + usize::from(walked > 0);
            match node.children.get(segment) {
                Some(Entry::Package(child)) => node = child,
                Some(Entry::Declaration) => return Err(conflict(&package[..walked])),
                None => {
                    trace!(segment, "New package segment");
                    return self.check_names(file, None);
                }
            }
        }
        self.check_names(file, Some(node))
    }

    fn check_names(&self, file: &FileDescriptor, node: Option<&PackageNode>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut conflicts = BTreeSet::new();
        for name in file.top_level_names() {
            let taken = node.is_some_and(|node| node.children.contains_key(name));
            if taken || !seen.insert(name) {
                conflicts.insert(name);
            }
        }
        match conflicts.into_iter().next() {
            Some(name) => Err(Error::name_conflict(
                file.path(),
                crate::descriptor::join_name(file.package(), name),
            )),
            None => Ok(()),
        }
    }

    fn insert(&mut self, file: Arc<FileDescriptor>) {
        let mut node = &mut self.root;
        for segment in segments(file.package()) {
            let entry = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Entry::Package(PackageNode::default()));
            node = match entry {
                Entry::Package(child) => child,
                // check() rejected files whose package crosses a declaration
                Entry::Declaration => return,
            };
        }
        for name in file.top_level_names() {
            node.children.insert(name.to_string(), Entry::Declaration);
        }
        node.files.push(Arc::clone(&file));
        self.by_path
            .entry(file.path().to_string())
            .or_default()
            .push(Arc::clone(&file));
        self.files.push(file);
    }

    /// Resolves a full name to its descriptor.
    ///
    /// Nested declarations resolve through the top-level declaration that
    /// encloses them.
    pub fn find_descriptor_by_name(&self, name: &str) -> std::result::Result<Descriptor, NotFound> {
        let mut node = &self.root;
        for segment in segments(name) {
            match node.children.get(segment) {
                Some(Entry::Package(child)) => node = child,
                Some(Entry::Declaration) => {
                    return node
                        .files
                        .iter()
                        .find_map(|file| file.descriptor_by_name(name))
                        .ok_or(NotFound);
                }
                None => return Err(NotFound),
            }
        }
        Err(NotFound)
    }

    /// Visits every registered file in registration order until `f`
    /// returns false
    pub fn range_files<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<FileDescriptor>) -> bool,
    {
        for file in &self.files {
            if !f(file) {
                return;
            }
        }
    }

    /// Visits the files of `package` and then those of its sub-packages.
    ///
    /// A name with a trailing `.` matches nothing.
    pub fn range_files_by_package<F>(&self, package: &str, mut f: F)
    where
        F: FnMut(&Arc<FileDescriptor>) -> bool,
    {
        if package.ends_with('.') {
            return;
        }
        if let Some(node) = self.root.walk(package) {
            node.visit(&mut f);
        }
    }

    /// Visits every file registered under `path`
    pub fn range_files_by_path<F>(&self, path: &str, mut f: F)
    where
        F: FnMut(&Arc<FileDescriptor>) -> bool,
    {
        let Some(files) = self.by_path.get(path) else {
            return;
        };
        for file in files {
            if !f(file) {
                return;
            }
        }
    }

    /// Collects `name` and every message it reaches through message-typed
    /// fields, each once. Names that do not resolve are reported in
    /// [`MessageClosure::unresolved`].
    pub fn message_closure(&self, name: &str) -> std::result::Result<MessageClosure, NotFound> {
        let root = self.find_message(name).ok_or(NotFound)?;

        let mut closure = MessageClosure::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root]);
        visited.insert(name.to_string());

        while let Some(message) = queue.pop_front() {
            let referenced = message
                .fields()
                .iter()
                .filter(|field| field.kind().is_message())
                .filter_map(|field| field.type_name());
            for type_name in referenced {
                if !visited.insert(type_name.to_string()) {
                    continue;
                }
                match self.find_message(type_name) {
                    Some(next) => queue.push_back(next),
                    None => closure.unresolved.push(type_name.to_string()),
                }
            }
            closure.messages.push(message);
        }

        trace!(
            name,
            messages = closure.messages.len(),
            unresolved = closure.unresolved.len(),
            "Resolved message closure"
        );
        Ok(closure)
    }

    fn find_message(&self, name: &str) -> Option<Arc<MessageDescriptor>> {
        match self.find_descriptor_by_name(name).ok()? {
            Descriptor::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// Messages reachable from one message, see [`Files::message_closure`]
#[derive(Debug, Clone, Default)]
pub struct MessageClosure {
    messages: Vec<Arc<MessageDescriptor>>,
    unresolved: Vec<String>,
}

impl MessageClosure {
    /// Reachable messages in breadth-first order, starting with the root
    pub fn messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.messages
    }

    /// Referenced type names that did not resolve to a registered message
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Full names of the reachable messages
    pub fn names(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.full_name()).collect()
    }
}

/// The process-wide default registry.
///
/// Nothing in this crate requires it; every operation works on an explicit
/// [`Files`] value.
pub fn global_files() -> &'static RwLock<Files> {
    static GLOBAL: OnceLock<RwLock<Files>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Files::new()))
}

fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split('.').filter(|segment| !segment.is_empty())
}
