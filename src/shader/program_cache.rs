//! Linked programs keyed by stage names, primitive class, and output count.
//!
//! The key uses compiled stage *names*, not source text: the stage cache
//! already maps identical text to identical names. A program without a
//! fragment stage is a transform-feedback program and captures
//! [`TRANSFORM_FEEDBACK_VARYINGS`] instead of rasterizing.

use std::fmt;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use super::issues::{DiagnosticFilter, IssueStage, Issues};
use crate::driver::{gl, ContextId, Driver, GeometryTopology, GlEnum, GlName};
use crate::util::hash::hash_uniform_name;
use crate::util::sync::lock;

/// Outputs captured by transform-feedback programs, interleaved.
pub const TRANSFORM_FEEDBACK_VARYINGS: [&str; 5] = [
    "outPosition",
    "outNormal",
    "outTangent",
    "outBitangent",
    "outTextureCoordinate",
];

/// Primitive class a subshader is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveClass {
    /// Points.
    Points,
    /// Lines.
    Lines,
    /// Triangles.
    Triangles,
}

impl PrimitiveClass {
    /// All classes, in subshader slot order.
    pub const ALL: [Self; 3] = [Self::Points, Self::Lines, Self::Triangles];

    /// Subshader slot index.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Points => 0,
            Self::Lines => 1,
            Self::Triangles => 2,
        }
    }

    /// Vertices per primitive.
    #[must_use]
    pub fn vertices_per_primitive(self) -> u32 {
        match self {
            Self::Points => 1,
            Self::Lines => 2,
            Self::Triangles => 3,
        }
    }

    /// Geometry-stage input topology.
    #[must_use]
    pub fn input_topology(self) -> GlEnum {
        match self {
            Self::Points => gl::POINTS,
            Self::Lines => gl::LINES,
            Self::Triangles => gl::TRIANGLES,
        }
    }

    /// Geometry-stage output topology when rasterizing.
    #[must_use]
    pub fn output_topology(self) -> GlEnum {
        match self {
            Self::Points => gl::POINTS,
            Self::Lines => gl::LINE_STRIP,
            Self::Triangles => gl::TRIANGLE_STRIP,
        }
    }
}

impl fmt::Display for PrimitiveClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Points => "points",
            Self::Lines => "lines",
            Self::Triangles => "triangles",
        })
    }
}

/// Program cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    /// Vertex stage (required).
    pub vertex: GlName,
    /// Geometry stage, or 0.
    pub geometry: GlName,
    /// Fragment stage, or 0 for transform feedback.
    pub fragment: GlName,
    /// Primitive class.
    pub class: PrimitiveClass,
    /// Primitives the geometry stage emits per input primitive.
    pub expected_output_count: u32,
}

impl ProgramKey {
    /// Whether programs with this key capture transform feedback.
    #[must_use]
    pub fn is_transform_feedback(&self) -> bool {
        self.fragment == 0
    }
}

/// A linked program and its resolved uniform locations.
#[derive(Debug)]
pub struct LinkedProgram {
    name: GlName,
    key: ProgramKey,
    locations: FxHashMap<u64, i32>,
}

impl LinkedProgram {
    /// GL program name.
    #[must_use]
    pub fn name(&self) -> GlName {
        self.name
    }

    /// The key this program was linked for.
    #[must_use]
    pub fn key(&self) -> &ProgramKey {
        &self.key
    }

    /// Whether this program captures transform feedback.
    #[must_use]
    pub fn is_transform_feedback(&self) -> bool {
        self.key.is_transform_feedback()
    }

    /// Location of a uniform or array element (`name[i]`).
    #[must_use]
    pub fn location(&self, name: &str) -> Option<i32> {
        self.locations.get(&hash_uniform_name(name)).copied()
    }

    /// Number of resolved uniform names (array elements included).
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}

/// Cache of linked programs plus per-context current-program tracking.
pub struct ProgramCache {
    driver: Arc<dyn Driver>,
    filter: DiagnosticFilter,
    validate: bool,
    entries: Mutex<FxHashMap<ProgramKey, Arc<LinkedProgram>>>,
    current: Mutex<FxHashMap<ContextId, GlName>>,
    validated: Mutex<FxHashSet<(ContextId, GlName)>>,
}

impl ProgramCache {
    /// Create an empty cache. With `validate`, each program is validated
    /// the first time a context uses it.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, filter: DiagnosticFilter, validate: bool) -> Self {
        Self {
            driver,
            filter,
            validate,
            entries: Mutex::new(FxHashMap::default()),
            current: Mutex::new(FxHashMap::default()),
            validated: Mutex::new(FxHashSet::default()),
        }
    }

    /// Link (or fetch) the program for `key`.
    ///
    /// `label` names the program in logs. Link failures are reported to
    /// `issues` when given, otherwise logged; the partial program is
    /// deleted and nothing is cached.
    pub fn link(
        &self,
        ctx: ContextId,
        key: ProgramKey,
        label: &str,
        issues: Option<&mut Issues>,
    ) -> Option<Arc<LinkedProgram>> {
        if key.vertex == 0 {
            log::error!("Can't link '{label}' without a vertex stage");
            return None;
        }

        let mut entries = lock(&self.entries);
        if let Some(program) = entries.get(&key) {
            return Some(Arc::clone(program));
        }

        let name = self.driver.create_program(ctx);
        if name == 0 {
            log::error!("Couldn't create a program for '{label}'");
            return None;
        }
        for stage in [key.vertex, key.geometry, key.fragment] {
            if stage != 0 {
                self.driver.attach_shader(ctx, name, stage);
            }
        }
        self.driver.bind_attrib_location(ctx, name, 0, "position");

        let transform_feedback = key.is_transform_feedback();
        if key.geometry != 0 {
            let input = key.class.input_topology();
            let output = if transform_feedback {
                input
            } else {
                key.class.output_topology()
            };
            self.driver.geometry_topology(
                ctx,
                name,
                GeometryTopology {
                    input,
                    output,
                    max_vertices: key.expected_output_count.max(1)
                        * key.class.vertices_per_primitive(),
                },
            );
        }
        if transform_feedback {
            self.driver
                .transform_feedback_varyings(ctx, name, &TRANSFORM_FEEDBACK_VARYINGS);
        }

        let status = self.driver.link_program(ctx, name);
        if !status.ok {
            self.driver.delete_program(ctx, name);
            drop(entries);
            match issues {
                Some(issues) => issues.extend(self.filter.parse(IssueStage::Program, &status.log)),
                None => log::error!(
                    "Failed to link '{label}' ({}):\n{}",
                    key.class,
                    status.log.trim_end()
                ),
            }
            return None;
        }
        if let Some(issues) = issues {
            issues.extend(self.filter.parse(IssueStage::Program, &status.log));
        }

        let program = Arc::new(LinkedProgram {
            name,
            key,
            locations: self.resolve_uniforms(ctx, name),
        });
        let _ = entries.insert(key, Arc::clone(&program));
        log::trace!(
            "Linked '{label}' ({}) as program {name} with {} uniform locations",
            key.class,
            program.location_count()
        );
        Some(program)
    }

    /// Map every active uniform (and each element of array uniforms) to
    /// its location.
    fn resolve_uniforms(&self, ctx: ContextId, program: GlName) -> FxHashMap<u64, i32> {
        let mut locations = FxHashMap::default();
        for uniform in self.driver.active_uniforms(ctx, program) {
            let base = uniform
                .name
                .strip_suffix("[0]")
                .unwrap_or(&uniform.name)
                .to_owned();
            let Some(location) = self.driver.uniform_location(ctx, program, &base) else {
                continue;
            };
            let _ = locations.insert(hash_uniform_name(&base), location);
            if uniform.size > 1 || uniform.name.ends_with("[0]") {
                let _ = locations.insert(hash_uniform_name(&format!("{base}[0]")), location);
                // Introspection only reports the first element.
                for i in 1..uniform.size {
                    let element = format!("{base}[{i}]");
                    if let Some(loc) = self.driver.uniform_location(ctx, program, &element) {
                        let _ = locations.insert(hash_uniform_name(&element), loc);
                    }
                }
            }
        }
        locations
    }

    /// Make `program` current on `ctx`, skipping the driver call when it
    /// already is. With validation on, the first use per context logs the
    /// driver's validation output.
    pub fn use_program(&self, ctx: ContextId, program: GlName) {
        {
            let mut current = lock(&self.current);
            if current.get(&ctx) == Some(&program) {
                return;
            }
            let _ = current.insert(ctx, program);
        }
        self.driver.use_program(ctx, program);

        if self.validate && program != 0 && lock(&self.validated).insert((ctx, program)) {
            let status = self.driver.validate_program(ctx, program);
            if status.ok {
                if !status.log.trim().is_empty() {
                    log::debug!(
                        "Program {program} validation on {ctx}:\n{}",
                        status.log.trim_end()
                    );
                }
            } else {
                log::error!(
                    "Program {program} failed validation on {ctx}:\n{}",
                    status.log.trim_end()
                );
            }
        }
    }

    /// Program this cache last made current on `ctx`.
    #[must_use]
    pub fn current_program(&self, ctx: ContextId) -> GlName {
        lock(&self.current).get(&ctx).copied().unwrap_or(0)
    }

    /// Forget `ctx`'s current program and unbind it.
    pub fn cleanup_context(&self, ctx: ContextId) {
        if lock(&self.current).remove(&ctx).is_some() {
            self.driver.use_program(ctx, 0);
        }
        lock(&self.validated).retain(|(c, _)| *c != ctx);
    }

    /// Number of cached programs.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}
