//! Opaque handles onto the frontend's world.
//!
//! The interpreter never walks an AST. Callees, invocation sites, modules,
//! and type information all arrive as integer handles resolved through
//! arenas owned by [`ImportData`], and bytecode for a callee is produced by
//! an external [`BytecodeEmitter`] behind the cache. This keeps the
//! execution engine decoupled from parsing and type checking while still
//! letting it answer the two questions a call needs: "which type info
//! specializes this callee?" and "what bytecode runs for it?".

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::bytecode::cache::BytecodeCache;
use crate::bytecode::BytecodeFunction;
use crate::error::{InterpError, InterpResult};
use crate::value::InterpValue;

/// A position in a source file (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

/// A source range attached to every bytecode for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Pos,
    pub limit: Pos,
}

impl Span {
    pub fn new(start: Pos, limit: Pos) -> Self {
        Self { start, limit }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.col, self.limit.line, self.limit.col
        )
    }
}

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).expect("arena index fits u32"))
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Handle onto a function declaration.
    FunctionId
);
arena_id!(
    /// Handle onto a module.
    ModuleId
);
arena_id!(
    /// Handle onto one invocation site (a call expression).
    InvocationId
);
arena_id!(
    /// Handle onto per-module type resolution results.
    TypeInfoId
);

/// What the interpreter needs to know about a callee.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: String,
    pub module: ModuleId,
    pub param_count: usize,
    pub is_parametric: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleData {
    pub name: String,
    pub root_type_info: TypeInfoId,
}

#[derive(Debug, Clone, Copy)]
pub struct InvocationSite {
    pub span: Span,
}

/// The concrete parameter-to-value mapping that specializes a parametric
/// function for one call site.
///
/// Bindings are sorted by name at construction so that equal environments
/// hash equally regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParametricEnv {
    bindings: IndexMap<String, InterpValue>,
}

impl ParametricEnv {
    pub fn new(pairs: impl IntoIterator<Item = (String, InterpValue)>) -> Self {
        let mut bindings: IndexMap<String, InterpValue> = pairs.into_iter().collect();
        bindings.sort_keys();
        Self { bindings }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&InterpValue> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InterpValue)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Hash for ParametricEnv {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Entries are name-sorted, so iteration order is canonical.
        self.bindings.len().hash(state);
        for (name, value) in &self.bindings {
            name.hash(state);
            value.hash(state);
        }
    }
}

impl fmt::Display for ParametricEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Per-module type resolution results.
///
/// The interpreter consults this for exactly one thing: mapping a
/// parametric invocation plus the caller's bindings onto the type info
/// that specializes the callee.
#[derive(Debug)]
pub struct TypeInfoData {
    module: ModuleId,
    instantiations: AHashMap<(InvocationId, ParametricEnv), TypeInfoId>,
}

impl TypeInfoData {
    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn instantiation(
        &self,
        invocation: InvocationId,
        caller_env: &ParametricEnv,
    ) -> Option<TypeInfoId> {
        self.instantiations
            .get(&(invocation, caller_env.clone()))
            .copied()
    }
}

/// Produces bytecode for a `(function, type info, parametric env)` triple.
///
/// Emission lives outside the interpreter core; the cache delegates here on
/// a miss and stores the result.
pub trait BytecodeEmitter {
    fn emit(
        &self,
        function: FunctionId,
        type_info: TypeInfoId,
        env: Option<&ParametricEnv>,
    ) -> InterpResult<BytecodeFunction>;
}

/// Owner of the frontend arenas, the bytecode cache, and the emitter.
///
/// Handed explicitly through the top-level entry; there is no process-wide
/// singleton.
pub struct ImportData {
    functions: Vec<FunctionData>,
    modules: Vec<ModuleData>,
    invocations: Vec<InvocationSite>,
    type_infos: Vec<TypeInfoData>,
    cache: BytecodeCache,
    emitter: Box<dyn BytecodeEmitter>,
}

impl ImportData {
    pub fn new(emitter: Box<dyn BytecodeEmitter>) -> Self {
        Self {
            functions: Vec::new(),
            modules: Vec::new(),
            invocations: Vec::new(),
            type_infos: Vec::new(),
            cache: BytecodeCache::default(),
            emitter,
        }
    }

    /// Registers a module together with its root type info.
    pub fn add_module(&mut self, name: impl Into<String>) -> ModuleId {
        let module = ModuleId::from_index(self.modules.len());
        let root_type_info = TypeInfoId::from_index(self.type_infos.len());
        self.type_infos.push(TypeInfoData {
            module,
            instantiations: AHashMap::new(),
        });
        self.modules.push(ModuleData {
            name: name.into(),
            root_type_info,
        });
        module
    }

    pub fn add_function(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        param_count: usize,
        is_parametric: bool,
    ) -> FunctionId {
        let id = FunctionId::from_index(self.functions.len());
        self.functions.push(FunctionData {
            name: name.into(),
            module,
            param_count,
            is_parametric,
        });
        id
    }

    pub fn add_invocation(&mut self, span: Span) -> InvocationId {
        let id = InvocationId::from_index(self.invocations.len());
        self.invocations.push(InvocationSite { span });
        id
    }

    /// Creates a derived (non-root) type info for a module, as produced by
    /// parametric instantiation.
    pub fn add_type_info(&mut self, module: ModuleId) -> TypeInfoId {
        let id = TypeInfoId::from_index(self.type_infos.len());
        self.type_infos.push(TypeInfoData {
            module,
            instantiations: AHashMap::new(),
        });
        id
    }

    /// Records that `invocation`, seen under `caller_env` within
    /// `type_info`, specializes to `instantiated`.
    pub fn add_instantiation(
        &mut self,
        type_info: TypeInfoId,
        invocation: InvocationId,
        caller_env: ParametricEnv,
        instantiated: TypeInfoId,
    ) {
        self.type_infos[type_info.index()]
            .instantiations
            .insert((invocation, caller_env), instantiated);
    }

    pub fn function(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id.index()]
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.index()]
    }

    pub fn invocation(&self, id: InvocationId) -> &InvocationSite {
        &self.invocations[id.index()]
    }

    pub fn type_info(&self, id: TypeInfoId) -> &TypeInfoData {
        &self.type_infos[id.index()]
    }

    pub fn root_type_info(&self, module: ModuleId) -> TypeInfoId {
        self.modules[module.index()].root_type_info
    }

    /// Resolves bytecode for a callee through the cache, emitting on a miss.
    pub fn get_or_create_bytecode(
        &mut self,
        function: FunctionId,
        type_info: TypeInfoId,
        env: Option<&ParametricEnv>,
    ) -> InterpResult<Rc<BytecodeFunction>> {
        self.cache
            .get_or_create(self.emitter.as_ref(), function, type_info, env)
    }

    /// Looks up a function by name, for embedders that address callees
    /// symbolically.
    pub fn find_function(&self, module: ModuleId, name: &str) -> InterpResult<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.module == module && f.name == name)
            .map(FunctionId::from_index)
            .ok_or_else(|| {
                InterpError::internal(format!(
                    "no function named {name} in module {}",
                    self.module(module).name
                ))
            })
    }
}

impl fmt::Debug for ImportData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportData")
            .field("functions", &self.functions.len())
            .field("modules", &self.modules.len())
            .field("invocations", &self.invocations.len())
            .field("type_infos", &self.type_infos.len())
            .finish_non_exhaustive()
    }
}
