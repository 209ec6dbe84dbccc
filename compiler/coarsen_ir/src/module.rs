//! Modules: functions, globals, and the kernel annotation list.

use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::function::Function;
use crate::ir::{AddressSpace, GlobalId, Type};

/// Target triple of device-side (kernel) modules.
pub const DEVICE_TRIPLE: &str = "nvptx64-nvidia-cuda";

/// Process-unique module identity, used to key cross-module caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(1);

impl ModuleId {
    /// Allocate a fresh identity.
    pub fn fresh() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Function calling conventions relevant to kernel detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallingConv {
    #[default]
    C,
    PtxKernel,
    PtxDevice,
}

/// A module-level global variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    /// Element type.
    pub ty: Type,
    /// Number of elements.
    pub len: u32,
    pub address_space: AddressSpace,
}

impl GlobalVar {
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.address_space == AddressSpace::Shared
    }
}

/// One `(symbol, key, value)` entry of the module annotation list, e.g.
/// `(@vecAdd, "kernel", 1)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub symbol: String,
    pub key: String,
    pub value: i64,
}

/// A compilation unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Module {
    #[serde(skip, default = "ModuleId::fresh")]
    id: ModuleId,
    pub name: String,
    pub target_triple: String,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVar>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Module {
    pub fn new(name: impl Into<String>, target_triple: impl Into<String>) -> Self {
        Self {
            id: ModuleId::fresh(),
            name: name.into(),
            target_triple: target_triple.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            annotations: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Is this a device-side module?
    pub fn is_device(&self) -> bool {
        self.target_triple == DEVICE_TRIPLE || self.target_triple.starts_with("nvptx")
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn add_function(&mut self, func: Function) -> usize {
        self.functions.push(func);
        self.functions.len() - 1
    }

    pub fn add_global(&mut self, global: GlobalVar) -> GlobalId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "module global counts fit in u32"
        )]
        let id = GlobalId::new(self.globals.len() as u32);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVar> {
        self.globals.get(id.index())
    }

    /// Globals living in shared (per-block) memory.
    pub fn shared_globals(&self) -> FxHashSet<GlobalId> {
        self.globals
            .iter()
            .enumerate()
            .filter(|(_, global)| global.is_shared())
            .map(|(idx, _)| {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "module global counts fit in u32"
                )]
                let raw = idx as u32;
                GlobalId::new(raw)
            })
            .collect()
    }

    /// Append an annotation entry.
    pub fn annotate(&mut self, symbol: impl Into<String>, key: impl Into<String>, value: i64) {
        self.annotations.push(Annotation {
            symbol: symbol.into(),
            key: key.into(),
            value,
        });
    }
}
