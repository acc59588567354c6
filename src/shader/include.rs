//! `#include` expansion.
//!
//! `#include "file"` and `#include <file>` lines are replaced with the
//! file's contents wrapped in begin/end marker comments naming the
//! resolved path. Files are looked up in the working directory first,
//! then in each installation-relative directory in order. A file already
//! pulled in earlier in the same expansion is skipped with a comment, which
//! also stops include cycles. A file that can't be found leaves a comment
//! in place and logs a warning; compilation then reports whatever the
//! missing code breaks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashSet;

use crate::options::ShaderOptions;

/// Result of expanding one source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    /// Expanded source.
    pub text: String,
    /// Resolved paths of every file inserted, in order.
    pub included: Vec<PathBuf>,
    /// Include names that could not be resolved.
    pub missing: Vec<String>,
}

/// Resolves and inlines `#include` directives.
#[derive(Debug)]
pub struct IncludeResolver {
    search_dirs: Vec<PathBuf>,
    reads: AtomicUsize,
}

impl IncludeResolver {
    /// Search exactly `search_dirs`, in order.
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            reads: AtomicUsize::new(0),
        }
    }

    /// Search the working directory, then `options.include_dirs` resolved
    /// against the install root (the executable's directory by default).
    #[must_use]
    pub fn from_options(options: &ShaderOptions) -> Self {
        let mut dirs = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        let root = options.install_root.clone().or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        });
        for dir in &options.include_dirs {
            match &root {
                Some(root) => dirs.push(root.join(dir)),
                None => dirs.push(dir.clone()),
            }
        }
        Self::new(dirs)
    }

    /// Directories searched, in order.
    #[must_use]
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Number of include files read from disk so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Find `name` in the search path.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Expand every `#include` in `source`, recursively.
    #[must_use]
    pub fn expand(&self, source: &str) -> Expansion {
        let mut expansion = Expansion::default();
        let mut seen = FxHashSet::default();
        self.expand_into(source, &mut seen, &mut expansion);
        expansion
    }

    fn expand_into(
        &self,
        source: &str,
        seen: &mut FxHashSet<PathBuf>,
        out: &mut Expansion,
    ) {
        for line in source.split_inclusive('\n') {
            let Some(name) = include_target(line) else {
                out.text.push_str(line);
                continue;
            };
            let Some(path) = self.resolve(name) else {
                log::warn!("Couldn't find included file '{name}'");
                out.text.push_str(&format!("// include not found: {name}\n"));
                out.missing.push(name.to_owned());
                continue;
            };
            if !seen.insert(path.clone()) {
                out.text.push_str(&format!(
                    "// skipped repeated include: {}\n",
                    path.display()
                ));
                continue;
            }
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    log::warn!("Couldn't read included file {}: {e}", path.display());
                    out.text.push_str(&format!("// include not readable: {name}\n"));
                    out.missing.push(name.to_owned());
                    continue;
                }
            };
            let _ = self.reads.fetch_add(1, Ordering::Relaxed);
            out.text.push_str(&format!("// begin include: {}\n", path.display()));
            out.included.push(path.clone());
            self.expand_into(&contents, seen, out);
            if !out.text.ends_with('\n') {
                out.text.push('\n');
            }
            out.text.push_str(&format!("// end include: {}\n", path.display()));
        }
    }
}

/// The file named by an `#include` line, if `line` is one.
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let name = &inner[..end];
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_directive_forms() {
        assert_eq!(include_target("#include \"foo.glsl\"\n"), Some("foo.glsl"));
        assert_eq!(include_target("  #  include <bar.glsl>"), Some("bar.glsl"));
        assert_eq!(include_target("#include foo.glsl"), None);
        assert_eq!(include_target("// #include \"x\""), None);
        assert_eq!(include_target("#include \"\""), None);
    }

    #[test]
    fn inserts_between_markers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.glsl"), "float bar(){return 1.;}").unwrap();
        let resolver = IncludeResolver::new(vec![dir.path().to_path_buf()]);

        let out = resolver.expand("#include \"foo.glsl\"\nvoid main(){}\n");
        let path = dir.path().join("foo.glsl");
        let expected = format!(
            "// begin include: {p}\nfloat bar(){{return 1.;}}\n\
             // end include: {p}\nvoid main(){{}}\n",
            p = path.display()
        );
        assert_eq!(out.text, expected);
        assert_eq!(out.included, vec![path]);
        assert_eq!(resolver.reads(), 1);
    }

    #[test]
    fn search_order_prefers_earlier_dirs() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("a.glsl"), "// first").unwrap();
        std::fs::write(second.path().join("a.glsl"), "// second").unwrap();
        std::fs::write(second.path().join("b.glsl"), "// only second").unwrap();
        let resolver = IncludeResolver::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        let out = resolver.expand("#include <a.glsl>\n#include <b.glsl>\n");
        assert!(out.text.contains("// first"));
        assert!(!out.text.contains("// second\n"));
        assert!(out.text.contains("// only second"));
    }

    #[test]
    fn cycles_and_repeats_are_skipped_with_a_comment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.glsl"), "#include \"b.glsl\"\nA\n").unwrap();
        std::fs::write(dir.path().join("b.glsl"), "#include \"a.glsl\"\nB\n").unwrap();
        let resolver = IncludeResolver::new(vec![dir.path().to_path_buf()]);
        let out = resolver.expand("#include \"a.glsl\"\n#include \"b.glsl\"\n");
        assert_eq!(out.included.len(), 2);
        assert_eq!(out.text.matches("// skipped repeated include").count(), 2);
        assert_eq!(out.text.matches("\nA\n").count(), 1);
    }

    #[test]
    fn missing_include_leaves_comment() {
        let resolver = IncludeResolver::new(Vec::new());
        let out = resolver.expand("#include \"nowhere.glsl\"\nvoid main(){}");
        assert_eq!(out.missing, vec!["nowhere.glsl".to_owned()]);
        assert!(out.text.starts_with("// include not found: nowhere.glsl\n"));
        assert!(out.text.ends_with("void main(){}"));
    }
}
