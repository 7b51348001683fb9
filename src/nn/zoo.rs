//! Synthetic models for demos and tests
//!
//! Module names follow the RoBERTa layout so target suffixes such as
//! `query`, `value` or `attention.output.dense` behave as they would on a
//! real checkpoint.

use super::{Container, Linear, Model, Opaque};
use crate::init::{normal, rng_from_seed};
use crate::tensor::Tensor;

const VOCAB_SIZE: usize = 128;
const NUM_LABELS: usize = 2;

/// RoBERTa-style encoder with random weights
///
/// `roberta.embeddings`, `roberta.encoder.layer.{i}` (self-attention,
/// attention output, intermediate, output) and a `classifier` head.
pub fn toy_encoder(layers: usize, hidden: usize, seed: u64) -> Model {
    let mut rng = rng_from_seed(Some(seed));
    let intermediate = 4 * hidden;

    let layer_norm = |width: usize| {
        Opaque::new("LayerNorm")
            .with_param("weight", Tensor::new(ndarray::Array2::ones((1, width)), true))
            .with_param("bias", Tensor::zeros(1, width, true))
    };

    let embeddings = Container::new()
        .with(
            "word_embeddings",
            Opaque::new("Embedding").with_param(
                "weight",
                Tensor::new(normal(VOCAB_SIZE, hidden, 0.0, 0.02, &mut rng), true),
            ),
        )
        .with("LayerNorm", layer_norm(hidden));

    let mut stack = Container::new();
    for i in 0..layers {
        let attention = Container::new()
            .with(
                "self",
                Container::new()
                    .with("query", Linear::init(hidden, hidden, true, &mut rng))
                    .with("key", Linear::init(hidden, hidden, true, &mut rng))
                    .with("value", Linear::init(hidden, hidden, true, &mut rng))
                    .with("dropout", Opaque::new("Dropout")),
            )
            .with(
                "output",
                Container::new()
                    .with("dense", Linear::init(hidden, hidden, true, &mut rng))
                    .with("LayerNorm", layer_norm(hidden)),
            );
        let layer = Container::new()
            .with("attention", attention)
            .with(
                "intermediate",
                Container::new().with("dense", Linear::init(hidden, intermediate, true, &mut rng)),
            )
            .with(
                "output",
                Container::new()
                    .with("dense", Linear::init(intermediate, hidden, true, &mut rng))
                    .with("LayerNorm", layer_norm(hidden)),
            );
        stack.push(i.to_string(), layer);
    }

    let roberta = Container::new()
        .with("embeddings", embeddings)
        .with("encoder", Container::new().with("layer", stack));
    let classifier = Container::new()
        .with("dense", Linear::init(hidden, hidden, true, &mut rng))
        .with("out_proj", Linear::init(hidden, NUM_LABELS, true, &mut rng));

    Model::new(Container::new().with("roberta", roberta).with("classifier", classifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let model = toy_encoder(2, 8, 0);
        let query = model.get_submodule("roberta.encoder.layer.1.attention.self.query").unwrap();
        assert_eq!(query.kind(), "Linear");
        let ffn = model.get_submodule("roberta.encoder.layer.0.intermediate.dense").unwrap();
        match ffn {
            crate::nn::Module::Linear(l) => {
                assert_eq!(l.in_features(), 8);
                assert_eq!(l.out_features(), 32);
            }
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(model.get_submodule("roberta.encoder.layer.2").is_err());
    }

    #[test]
    fn test_seeded_models_are_identical() {
        assert_eq!(toy_encoder(1, 8, 5), toy_encoder(1, 8, 5));
        assert_ne!(toy_encoder(1, 8, 5), toy_encoder(1, 8, 6));
    }
}
