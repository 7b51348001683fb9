//! Model root and named traversal

use super::{Container, Module};
use crate::error::{LoraXsError, Result};
use crate::tensor::Tensor;

/// A module tree plus model-level flags
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    root: Module,
    loaded_in_8bit: bool,
}

impl Model {
    pub fn new(root: Container) -> Self {
        Self { root: Module::Container(root), loaded_in_8bit: false }
    }

    /// Builder: mark the model as loaded with int8 weights
    #[must_use]
    pub fn with_8bit(mut self, loaded_in_8bit: bool) -> Self {
        self.loaded_in_8bit = loaded_in_8bit;
        self
    }

    pub fn root(&self) -> &Module {
        &self.root
    }

    /// Whether the base weights were loaded in 8-bit
    pub fn is_loaded_in_8bit(&self) -> bool {
        self.loaded_in_8bit
    }

    /// Pre-order traversal yielding `(qualified name, module)`
    ///
    /// The root comes first under the empty name.
    pub fn named_modules(&self) -> NamedModules<'_> {
        NamedModules { stack: vec![(String::new(), &self.root)] }
    }

    /// Resolve a dotted name; the empty name is the root
    pub fn get_submodule(&self, name: &str) -> Result<&Module> {
        if name.is_empty() {
            return Ok(&self.root);
        }
        name.split('.')
            .try_fold(&self.root, |module, part| module.child(part))
            .ok_or_else(|| LoraXsError::ModuleNotFound { name: name.to_string() })
    }

    pub fn get_submodule_mut(&mut self, name: &str) -> Result<&mut Module> {
        if name.is_empty() {
            return Ok(&mut self.root);
        }
        name.split('.')
            .try_fold(&mut self.root, |module, part| module.child_mut(part))
            .ok_or_else(|| LoraXsError::ModuleNotFound { name: name.to_string() })
    }

    /// Every parameter with its fully qualified name, in traversal order
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        self.named_modules()
            .flat_map(|(prefix, module)| {
                module
                    .local_parameters()
                    .into_iter()
                    .map(move |(name, p)| (join(&prefix, &name), p))
            })
            .collect()
    }

    /// Visit every parameter mutably
    pub fn for_each_parameter_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&str, &mut Tensor),
    {
        fn visit<F: FnMut(&str, &mut Tensor)>(prefix: &str, module: &mut Module, f: &mut F) {
            if let Module::Container(c) = module {
                for (name, child) in &mut c.children {
                    visit(&join(prefix, name), child, f);
                }
                return;
            }
            for (name, p) in module.local_parameters_mut() {
                f(&join(prefix, &name), p);
            }
        }
        visit("", &mut self.root, &mut f);
    }

    /// Total scalar parameter count
    pub fn num_parameters(&self) -> usize {
        self.named_parameters().iter().map(|(_, p)| p.len()).sum()
    }

    /// Scalar count of parameters with `requires_grad`
    pub fn num_trainable_parameters(&self) -> usize {
        self.named_parameters()
            .iter()
            .filter(|(_, p)| p.requires_grad())
            .map(|(_, p)| p.len())
            .sum()
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Iterator returned by [`Model::named_modules`]
pub struct NamedModules<'a> {
    stack: Vec<(String, &'a Module)>,
}

impl<'a> Iterator for NamedModules<'a> {
    type Item = (String, &'a Module);

    fn next(&mut self) -> Option<Self::Item> {
        let (name, module) = self.stack.pop()?;
        for (child_name, child) in module.children().iter().rev() {
            self.stack.push((join(&name, child_name), child));
        }
        Some((name, module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::rng_from_seed;
    use crate::nn::{Linear, Opaque};

    fn tiny() -> Model {
        let mut rng = rng_from_seed(Some(1));
        let attn = Container::new()
            .with("query", Linear::init(4, 4, true, &mut rng))
            .with("value", Linear::init(4, 4, true, &mut rng));
        let layer = Container::new()
            .with("attention", attn)
            .with("norm", Opaque::new("LayerNorm").with_param("weight", Tensor::zeros(1, 4, true)));
        Model::new(Container::new().with("encoder", Container::new().with("0", layer)))
    }

    #[test]
    fn test_named_modules_pre_order() {
        let model = tiny();
        let names: Vec<String> = model.named_modules().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "",
                "encoder",
                "encoder.0",
                "encoder.0.attention",
                "encoder.0.attention.query",
                "encoder.0.attention.value",
                "encoder.0.norm",
            ]
        );
    }

    #[test]
    fn test_get_submodule() {
        let mut model = tiny();
        assert_eq!(model.get_submodule("encoder.0.attention.query").unwrap().kind(), "Linear");
        assert!(model.get_submodule_mut("encoder.0.norm").is_ok());
        let err = model.get_submodule("encoder.1").unwrap_err();
        assert!(matches!(err, LoraXsError::ModuleNotFound { ref name } if name == "encoder.1"));
        assert!(model.get_submodule("encoder.0.attention.query.weight").is_err());
    }

    #[test]
    fn test_named_parameters_are_qualified() {
        let model = tiny();
        let names: Vec<String> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "encoder.0.attention.query.weight",
                "encoder.0.attention.query.bias",
                "encoder.0.attention.value.weight",
                "encoder.0.attention.value.bias",
                "encoder.0.norm.weight",
            ]
        );
        assert_eq!(model.num_parameters(), 2 * (16 + 4) + 4);
    }

    #[test]
    fn test_for_each_parameter_mut_freezes() {
        let mut model = tiny();
        model.for_each_parameter_mut(|name, p| {
            if name.ends_with("bias") {
                p.set_requires_grad(false);
            }
        });
        assert_eq!(model.num_trainable_parameters(), 2 * 16 + 4);
    }

    #[test]
    fn test_traversal_is_restartable() {
        let model = tiny();
        assert_eq!(model.named_modules().count(), model.named_modules().count());
    }
}
