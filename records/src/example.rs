//! Protobuf messages of `tensorflow/core/example/{feature,example}.proto`.
//!
//! Only the messages needed to carry a `SequenceExample` are defined; the field tags match the
//! upstream definitions so files written by other tools decode unchanged.

use std::collections::HashMap;

#[derive(Clone, PartialEq, prost::Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

/// A single feature value, one of the three list kinds.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

impl Feature {
    pub fn int64s<I: IntoIterator<Item = i64>>(values: I) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List {
                value: values.into_iter().collect(),
            })),
        }
    }

    pub fn floats<I: IntoIterator<Item = f32>>(values: I) -> Self {
        Self {
            kind: Some(feature::Kind::FloatList(FloatList {
                value: values.into_iter().collect(),
            })),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeatureList {
    #[prost(message, repeated, tag = "1")]
    pub feature: Vec<Feature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeatureLists {
    #[prost(map = "string, message", tag = "1")]
    pub feature_list: HashMap<String, FeatureList>,
}

/// An example made of a per-sequence context and per-step feature lists.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SequenceExample {
    #[prost(message, optional, tag = "1")]
    pub context: Option<Features>,
    #[prost(message, optional, tag = "2")]
    pub feature_lists: Option<FeatureLists>,
}

impl SequenceExample {
    /// Creates a `SequenceExample` with an empty context and the given feature lists.
    ///
    /// # Arguments
    /// * `lists` - Pairs of feature list key and the per step features.
    pub fn from_feature_lists<I, K>(lists: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<Feature>)>,
        K: Into<String>,
    {
        let feature_list = lists
            .into_iter()
            .map(|(key, feature)| (key.into(), FeatureList { feature }))
            .collect();

        Self {
            context: None,
            feature_lists: Some(FeatureLists { feature_list }),
        }
    }
}
