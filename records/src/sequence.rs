use std::collections::HashMap;

use prost::Message;

use crate::{
    RecordErr, Result,
    example::{Feature, FeatureList, SequenceExample, feature::Kind},
};

/// Describes which feature lists make up a melody and how wide each step is.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSpec {
    pub labels_key: String,
    pub inputs_key: String,
    pub input_size: usize,
    /// Feature lists that parse as empty instead of failing when absent.
    pub missing_assumed_empty: Vec<String>,
}

impl SequenceSpec {
    /// Creates a new `SequenceSpec` with the default `labels`/`inputs` keys.
    ///
    /// # Arguments
    /// * `input_size` - The amount of floats in every step of the inputs list.
    pub fn new(input_size: usize) -> Self {
        Self {
            labels_key: "labels".into(),
            inputs_key: "inputs".into(),
            input_size,
            missing_assumed_empty: Vec::new(),
        }
    }
}

impl Default for SequenceSpec {
    /// The melody encoding of the basic rnn: notes 48 to 84 plus the two special events.
    fn default() -> Self {
        Self::new(38)
    }
}

/// One parsed melody: an event label and a feature vector per time step.
#[derive(Debug, Clone, PartialEq)]
pub struct MelodySequence {
    pub labels: Vec<i64>,
    /// Row major `[steps, input_size]`.
    pub inputs: Vec<f32>,
    pub input_size: usize,
}

impl MelodySequence {
    /// Returns the amount of steps of the inputs feature list.
    pub fn steps(&self) -> usize {
        self.inputs.len().checked_div(self.input_size).unwrap_or_default()
    }

    /// Returns the feature vector at `step`.
    ///
    /// # Panics
    /// If `step` is out of bounds.
    pub fn input(&self, step: usize) -> &[f32] {
        let start = step * self.input_size;
        &self.inputs[start..start + self.input_size]
    }
}

/// Parses a serialized `SequenceExample` into a `MelodySequence`.
///
/// # Arguments
/// * `bytes` - The serialized protobuf message.
/// * `spec` - The expected layout of the feature lists.
///
/// # Returns
/// The parsed melody or an error if the message is malformed or doesn't follow `spec`.
pub fn parse_sequence_example(bytes: &[u8], spec: &SequenceSpec) -> Result<MelodySequence> {
    let example = SequenceExample::decode(bytes)?;
    let mut lists = example
        .feature_lists
        .map(|lists| lists.feature_list)
        .unwrap_or_default();

    let label_steps = take_list(&mut lists, &spec.labels_key, spec)?;
    let input_steps = take_list(&mut lists, &spec.inputs_key, spec)?;

    let mut labels = Vec::with_capacity(label_steps.len());
    for (step, feature) in label_steps.into_iter().enumerate() {
        match feature.kind {
            Some(Kind::Int64List(list)) if list.value.len() == 1 => labels.push(list.value[0]),
            Some(Kind::Int64List(list)) => {
                return Err(shape_err(&spec.labels_key, step, list.value.len(), 1));
            }
            _ => return Err(type_err(&spec.labels_key, step)),
        }
    }

    let mut inputs = Vec::with_capacity(input_steps.len() * spec.input_size);
    for (step, feature) in input_steps.into_iter().enumerate() {
        match feature.kind {
            Some(Kind::FloatList(list)) if list.value.len() == spec.input_size => {
                inputs.extend(list.value)
            }
            Some(Kind::FloatList(list)) => {
                return Err(shape_err(
                    &spec.inputs_key,
                    step,
                    list.value.len(),
                    spec.input_size,
                ));
            }
            _ => return Err(type_err(&spec.inputs_key, step)),
        }
    }

    Ok(MelodySequence {
        labels,
        inputs,
        input_size: spec.input_size,
    })
}

/// Serializes a `MelodySequence` as a `SequenceExample` following `spec`.
///
/// # Arguments
/// * `sequence` - The melody to serialize.
/// * `spec` - The feature list keys to use.
///
/// # Returns
/// The encoded protobuf message.
pub fn encode_sequence_example(sequence: &MelodySequence, spec: &SequenceSpec) -> Vec<u8> {
    let labels: Vec<Feature> = sequence
        .labels
        .iter()
        .map(|&label| Feature::int64s([label]))
        .collect();

    let inputs: Vec<Feature> = (0..sequence.steps())
        .map(|step| Feature::floats(sequence.input(step).iter().copied()))
        .collect();

    SequenceExample::from_feature_lists([
        (spec.labels_key.as_str(), labels),
        (spec.inputs_key.as_str(), inputs),
    ])
    .encode_to_vec()
}

fn take_list(
    lists: &mut HashMap<String, FeatureList>,
    key: &str,
    spec: &SequenceSpec,
) -> Result<Vec<Feature>> {
    match lists.remove(key) {
        Some(list) => Ok(list.feature),
        None if spec.missing_assumed_empty.iter().any(|k| k == key) => Ok(Vec::new()),
        None => Err(RecordErr::MissingFeatureList(key.to_string())),
    }
}

fn shape_err(key: &str, step: usize, got: usize, expected: usize) -> RecordErr {
    RecordErr::FeatureShape {
        key: key.to_string(),
        step,
        got,
        expected,
    }
}

fn type_err(key: &str, step: usize) -> RecordErr {
    RecordErr::FeatureType {
        key: key.to_string(),
        step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(label: usize, size: usize) -> Vec<f32> {
        (0..size).map(|i| (i == label) as u32 as f32).collect()
    }

    fn melody(labels: &[i64], input_size: usize) -> MelodySequence {
        MelodySequence {
            labels: labels.to_vec(),
            inputs: labels
                .iter()
                .flat_map(|&l| one_hot(l as usize, input_size))
                .collect(),
            input_size,
        }
    }

    #[test]
    fn parse_encoded() {
        let spec = SequenceSpec::new(4);
        let expected = melody(&[0, 3, 1, 2, 2], 4);

        let bytes = encode_sequence_example(&expected, &spec);
        let parsed = parse_sequence_example(&bytes, &spec).unwrap();

        assert_eq!(parsed, expected);
        assert_eq!(parsed.steps(), 5);
        assert_eq!(parsed.input(1), &[0., 0., 0., 1.]);
    }

    #[test]
    fn missing_list() {
        let spec = SequenceSpec::new(2);
        let example = SequenceExample::from_feature_lists([(
            "labels",
            vec![Feature::int64s([1]), Feature::int64s([0])],
        )]);
        let bytes = example.encode_to_vec();

        match parse_sequence_example(&bytes, &spec) {
            Err(RecordErr::MissingFeatureList(key)) => assert_eq!(key, "inputs"),
            other => panic!("expected a missing list, got {other:?}"),
        }

        let spec = SequenceSpec {
            missing_assumed_empty: vec!["inputs".into()],
            ..spec
        };
        let parsed = parse_sequence_example(&bytes, &spec).unwrap();
        assert_eq!(parsed.labels, [1, 0]);
        assert_eq!(parsed.steps(), 0);
    }

    #[test]
    fn wrong_input_width() {
        let spec = SequenceSpec::new(3);
        let example = SequenceExample::from_feature_lists([
            ("labels", vec![Feature::int64s([1]), Feature::int64s([2])]),
            (
                "inputs",
                vec![Feature::floats([0., 1., 0.]), Feature::floats([0., 1.])],
            ),
        ]);

        match parse_sequence_example(&example.encode_to_vec(), &spec) {
            Err(RecordErr::FeatureShape {
                key,
                step,
                got,
                expected,
            }) => {
                assert_eq!(key, "inputs");
                assert_eq!((step, got, expected), (1, 2, 3));
            }
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_label_type() {
        let spec = SequenceSpec::new(1);
        let example = SequenceExample::from_feature_lists([
            ("labels", vec![Feature::floats([1.])]),
            ("inputs", vec![Feature::floats([1.])]),
        ]);

        assert!(matches!(
            parse_sequence_example(&example.encode_to_vec(), &spec),
            Err(RecordErr::FeatureType { step: 0, .. })
        ));
    }

    #[test]
    fn garbage_bytes() {
        let spec = SequenceSpec::default();
        assert!(matches!(
            parse_sequence_example(&[0xff, 0xff, 0xff], &spec),
            Err(RecordErr::Decode(_))
        ));
    }
}
