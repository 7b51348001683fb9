//! Owned module tree
//!
//! A model is a tree of named [`Module`]s. Containers hold ordered children;
//! every other variant is a leaf that owns its parameters. Qualified names
//! join the path with `.`, e.g. `encoder.layer.0.attention.self.query`.

mod linear;
mod model;
pub mod zoo;

pub use linear::Linear;
pub use model::{Model, NamedModules};

use crate::lora::{LoraLinear, QuantizedLoraLinear};
use crate::tensor::Tensor;

/// Node of the module tree
#[derive(Debug, Clone, PartialEq)]
pub enum Module {
    /// Ordered collection of named children
    Container(Container),
    /// Plain dense layer
    Linear(Linear),
    /// Dense layer wrapped with LoRA adapters
    Lora(LoraLinear),
    /// LoRA layer over an int8-quantized base weight
    QuantizedLora(QuantizedLoraLinear),
    /// Any other leaf (norms, embeddings, ...) carried only for its parameters
    Opaque(Opaque),
}

impl Module {
    /// Short type name used in diagnostics
    pub fn kind(&self) -> &str {
        match self {
            Self::Container(_) => "Container",
            Self::Linear(_) => "Linear",
            Self::Lora(_) => "LoraLinear",
            Self::QuantizedLora(_) => "QuantizedLoraLinear",
            Self::Opaque(o) => o.kind(),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    /// Direct children; empty for leaves
    pub fn children(&self) -> &[(String, Module)] {
        match self {
            Self::Container(c) => &c.children,
            _ => &[],
        }
    }

    /// Child called `name`
    pub fn child(&self, name: &str) -> Option<&Module> {
        match self {
            Self::Container(c) => c.get(name),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Module> {
        match self {
            Self::Container(c) => c.get_mut(name),
            _ => None,
        }
    }

    pub fn as_lora(&self) -> Option<&LoraLinear> {
        match self {
            Self::Lora(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_lora_mut(&mut self) -> Option<&mut LoraLinear> {
        match self {
            Self::Lora(l) => Some(l),
            _ => None,
        }
    }

    /// Parameters owned directly by this module (not its children)
    pub fn local_parameters(&self) -> Vec<(String, &Tensor)> {
        match self {
            Self::Container(_) => Vec::new(),
            Self::Linear(l) => {
                l.named_parameters().into_iter().map(|(n, p)| (n.to_string(), p)).collect()
            }
            Self::Lora(l) => l.named_parameters(),
            Self::QuantizedLora(q) => q.named_parameters(),
            Self::Opaque(o) => o.params.iter().map(|(n, p)| (n.clone(), p)).collect(),
        }
    }

    pub fn local_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        match self {
            Self::Container(_) => Vec::new(),
            Self::Linear(l) => {
                l.named_parameters_mut().into_iter().map(|(n, p)| (n.to_string(), p)).collect()
            }
            Self::Lora(l) => l.named_parameters_mut(),
            Self::QuantizedLora(q) => q.named_parameters_mut(),
            Self::Opaque(o) => o.params.iter_mut().map(|(n, p)| (n.clone(), p)).collect(),
        }
    }
}

impl From<Linear> for Module {
    fn from(layer: Linear) -> Self {
        Self::Linear(layer)
    }
}

impl From<LoraLinear> for Module {
    fn from(layer: LoraLinear) -> Self {
        Self::Lora(layer)
    }
}

impl From<QuantizedLoraLinear> for Module {
    fn from(layer: QuantizedLoraLinear) -> Self {
        Self::QuantizedLora(layer)
    }
}

impl From<Container> for Module {
    fn from(container: Container) -> Self {
        Self::Container(container)
    }
}

impl From<Opaque> for Module {
    fn from(opaque: Opaque) -> Self {
        Self::Opaque(opaque)
    }
}

/// Ordered named children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    children: Vec<(String, Module)>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a child
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, module: impl Into<Module>) -> Self {
        self.push(name, module);
        self
    }

    /// Append a child, replacing any existing child of the same name in place
    pub fn push(&mut self, name: impl Into<String>, module: impl Into<Module>) {
        let name = name.into();
        let module = module.into();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = module,
            None => self.children.push((name, module)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.children.iter_mut().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Leaf the adaptation engine never touches
#[derive(Debug, Clone, PartialEq)]
pub struct Opaque {
    kind: String,
    params: Vec<(String, Tensor)>,
}

impl Opaque {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), params: Vec::new() }
    }

    /// Builder: attach a parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.params.push((name.into(), tensor));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}
