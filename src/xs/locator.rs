//! Target module lookup by name suffix

use crate::nn::{Model, Module};

/// Leaf modules whose qualified name ends with one of `suffixes`
///
/// Lazy and in traversal order. Matching is a plain string suffix test, so
/// `query` also matches `...self.query` and `attention.output.dense` matches
/// only that path tail. Containers never match.
pub fn find_targets<'a, S>(
    model: &'a Model,
    suffixes: &'a [S],
) -> impl Iterator<Item = (String, &'a Module)> + 'a
where
    S: AsRef<str>,
{
    model.named_modules().filter(move |(name, module)| {
        !module.is_container() && suffixes.iter().any(|s| name.ends_with(s.as_ref()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::zoo::toy_encoder;

    #[test]
    fn test_suffix_match_in_traversal_order() {
        let model = toy_encoder(2, 8, 0);
        let names: Vec<String> =
            find_targets(&model, &["query", "value"]).map(|(name, _)| name).collect();
        assert_eq!(
            names,
            [
                "roberta.encoder.layer.0.attention.self.query",
                "roberta.encoder.layer.0.attention.self.value",
                "roberta.encoder.layer.1.attention.self.query",
                "roberta.encoder.layer.1.attention.self.value",
            ]
        );
    }

    #[test]
    fn test_multi_segment_suffix() {
        let model = toy_encoder(1, 8, 0);
        let names: Vec<String> =
            find_targets(&model, &["attention.output.dense"]).map(|(name, _)| name).collect();
        assert_eq!(names, ["roberta.encoder.layer.0.attention.output.dense"]);
    }

    #[test]
    fn test_containers_never_match() {
        let model = toy_encoder(1, 8, 0);
        assert_eq!(find_targets(&model, &["attention"]).count(), 0);
        // `output` is a container; only leaves under it could match `dense`
        assert_eq!(find_targets(&model, &["output"]).count(), 0);
    }

    #[test]
    fn test_restartable() {
        let model = toy_encoder(2, 8, 0);
        let suffixes = vec!["dense".to_string()];
        let first: Vec<String> = find_targets(&model, &suffixes).map(|(n, _)| n).collect();
        let second: Vec<String> = find_targets(&model, &suffixes).map(|(n, _)| n).collect();
        assert_eq!(first, second);
        // attention.output, intermediate, output per layer plus classifier.dense
        assert_eq!(first.len(), 2 * 3 + 1);
    }
}
