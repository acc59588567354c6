//! Content-addressed cache of compiled shader stages.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use super::include::IncludeResolver;
use super::issues::{DiagnosticFilter, Issues, Severity};
use super::source::StageKind;
use crate::driver::{ContextId, Driver, GlName};
use crate::util::hash::hash_source;
use crate::util::sync::lock;

/// A compiled stage and the unexpanded text it came from.
struct CachedStage {
    source: String,
    name: GlName,
}

/// Compiled stages keyed by `(stage, hash of the unexpanded source)`.
///
/// Entries live as long as the cache; nothing is ever deleted. Because
/// the key is the text *before* `#include` expansion, a cache hit never
/// touches the include files. A hit also compares the stored text, so
/// two sources with the same hash get separate entries.
pub struct ShaderCache {
    driver: Arc<dyn Driver>,
    resolver: IncludeResolver,
    filter: DiagnosticFilter,
    entries: Mutex<FxHashMap<(StageKind, u64), Vec<CachedStage>>>,
}

impl ShaderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(
        driver: Arc<dyn Driver>,
        resolver: IncludeResolver,
        filter: DiagnosticFilter,
    ) -> Self {
        Self {
            driver,
            resolver,
            filter,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// The resolver used for `#include` expansion.
    #[must_use]
    pub fn resolver(&self) -> &IncludeResolver {
        &self.resolver
    }

    /// The diagnostic filter applied to compiler logs.
    #[must_use]
    pub fn filter(&self) -> &DiagnosticFilter {
        &self.filter
    }

    /// Expand `#include` directives in `source`.
    #[must_use]
    pub fn expand(&self, source: &str) -> String {
        self.resolver.expand(source).text
    }

    /// Compile `source` as `stage`, returning the shader name or 0.
    ///
    /// Without a collector, identical text returns the cached name. With
    /// one, the cache is bypassed in both directions: the stage is always
    /// compiled fresh (so every diagnostic is reported) and the result is
    /// not stored. Failures are never cached.
    pub fn compile(
        &self,
        ctx: ContextId,
        stage: StageKind,
        source: &str,
        issues: Option<&mut Issues>,
    ) -> GlName {
        self.compile_keyed(ctx, (stage, hash_source(source)), source, issues)
    }

    fn compile_keyed(
        &self,
        ctx: ContextId,
        key: (StageKind, u64),
        source: &str,
        issues: Option<&mut Issues>,
    ) -> GlName {
        let stage = key.0;
        let mut entries = lock(&self.entries);
        if issues.is_none() {
            let cached = entries
                .get(&key)
                .and_then(|bucket| bucket.iter().find(|c| c.source == source));
            if let Some(cached) = cached {
                return cached.name;
            }
        }

        let expanded = self.resolver.expand(source).text;
        let result = self.driver.compile_shader(ctx, stage.gl_enum(), &expanded);
        let parsed = self.filter.parse(stage.into(), &result.log);

        if !result.compiled || result.name == 0 {
            drop(entries);
            match issues {
                Some(issues) => issues.extend(parsed),
                None => log::error!(
                    "Failed to compile {stage} shader:\n{}",
                    result.log.trim_end()
                ),
            }
            if result.name != 0 {
                self.driver.delete_shader(ctx, result.name);
            }
            return 0;
        }

        match issues {
            Some(issues) => issues.extend(parsed),
            None => {
                for issue in parsed.iter().filter(|i| i.severity == Severity::Warning) {
                    log::warn!("{issue}");
                }
                entries.entry(key).or_default().push(CachedStage {
                    source: source.to_owned(),
                    name: result.name,
                });
            }
        }
        result.name
    }

    /// Number of cached stages.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).values().map(Vec::len).sum()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::headless::HeadlessDriver;
    use crate::shader::GENERATED_LINE_THRESHOLD;

    const VS: &str = "void main(){ gl_Position = vec4(0.); }";

    fn cache(dirs: Vec<std::path::PathBuf>) -> (Arc<HeadlessDriver>, ContextId, ShaderCache) {
        let driver = Arc::new(HeadlessDriver::default());
        let ctx = driver.create_context(None).unwrap();
        let cache = ShaderCache::new(
            driver.clone(),
            IncludeResolver::new(dirs),
            DiagnosticFilter::new(
                vec!["not read by fragment shader".to_owned()],
                GENERATED_LINE_THRESHOLD,
            ),
        );
        (driver, ctx, cache)
    }

    #[test]
    fn identical_source_hits_cache() {
        let (driver, ctx, cache) = cache(Vec::new());
        let a = cache.compile(ctx, StageKind::Vertex, VS, None);
        let b = cache.compile(ctx, StageKind::Vertex, VS, None);
        assert_ne!(a, 0);
        assert_eq!(a, b);
        assert_eq!(driver.stats().shaders_compiled, 1);
    }

    #[test]
    fn stage_kind_is_part_of_the_key() {
        let (_driver, ctx, cache) = cache(Vec::new());
        let v = cache.compile(ctx, StageKind::Vertex, VS, None);
        let f = cache.compile(ctx, StageKind::Fragment, VS, None);
        assert_ne!(v, f);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn colliding_hashes_keep_separate_entries() {
        let (driver, ctx, cache) = cache(Vec::new());
        let key = (StageKind::Fragment, 7);
        let a = cache.compile_keyed(ctx, key, "void main(){ /* a */ }", None);
        let b = cache.compile_keyed(ctx, key, "void main(){ /* b */ }", None);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.compile_keyed(ctx, key, "void main(){ /* a */ }", None), a);
        assert_eq!(cache.compile_keyed(ctx, key, "void main(){ /* b */ }", None), b);
        assert_eq!(driver.stats().shaders_compiled, 2);
    }

    #[test]
    fn collector_always_compiles_fresh() {
        let (driver, ctx, cache) = cache(Vec::new());
        let cached = cache.compile(ctx, StageKind::Vertex, VS, None);
        let mut issues = Issues::new();
        let fresh = cache.compile(ctx, StageKind::Vertex, VS, Some(&mut issues));
        assert_ne!(fresh, cached);
        let again = cache.compile(ctx, StageKind::Vertex, VS, Some(&mut issues));
        assert_ne!(again, fresh);
        assert_eq!(driver.stats().shaders_compiled, 3);
        assert_eq!(cache.compile(ctx, StageKind::Vertex, VS, None), cached);
    }

    #[test]
    fn failures_are_reported_and_not_cached() {
        let (driver, ctx, cache) = cache(Vec::new());
        driver.fail_compile_when("oops", "ERROR: 0:{line}: 'oops' : syntax error");
        let src = "void main()\n{\n  oops;\n}";
        let mut issues = Issues::new();
        assert_eq!(cache.compile(ctx, StageKind::Fragment, src, Some(&mut issues)), 0);
        assert!(issues.has_errors());
        let first = issues.iter().next().unwrap();
        assert_eq!(first.line, crate::shader::issues::IssueLine::Line(3));

        assert_eq!(cache.compile(ctx, StageKind::Fragment, src, None), 0);
        assert_eq!(cache.compile(ctx, StageKind::Fragment, src, None), 0);
        assert_eq!(driver.stats().shaders_compiled, 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn benign_warning_is_filtered() {
        let (driver, ctx, cache) = cache(Vec::new());
        driver.warn_compile_when(
            "vTex",
            "WARNING: Output of vertex shader 'vTex' not read by fragment shader",
        );
        let mut issues = Issues::new();
        let src = "varying vec2 vTex; void main(){}";
        let name = cache.compile(ctx, StageKind::Vertex, src, Some(&mut issues));
        assert_ne!(name, 0);
        assert!(issues.is_empty());
    }

    #[test]
    fn include_is_expanded_once_and_cache_hit_skips_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.glsl"), "float bar(){return 1.;}\n").unwrap();
        let (_driver, ctx, cache) = cache(vec![dir.path().to_path_buf()]);
        let src = "#include \"foo.glsl\"\nvoid main(){ bar(); }\n";

        let expanded = cache.expand(src);
        let begin = expanded.find("// begin include:").unwrap();
        let body = expanded.find("float bar(){return 1.;}").unwrap();
        let end = expanded.find("// end include:").unwrap();
        assert!(begin < body && body < end);

        let reads_before = cache.resolver().reads();
        let first = cache.compile(ctx, StageKind::Vertex, src, None);
        assert_eq!(cache.resolver().reads(), reads_before + 1);
        std::fs::remove_file(dir.path().join("foo.glsl")).unwrap();
        let second = cache.compile(ctx, StageKind::Vertex, src, None);
        assert_eq!(first, second);
        assert_eq!(cache.resolver().reads(), reads_before + 1);
    }
}
