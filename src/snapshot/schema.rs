use std::collections::HashMap;

use super::KnownParameters;
use super::ParamInfo;
use crate::keys;
use crate::Error;
use crate::ParamKey;
use crate::Result;

/// In-memory set of declared parameters
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    sets: HashMap<String, HashMap<String, ParamInfo>>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter with default properties
    pub fn with(
        self,
        set_name: &str,
        param_name: &str,
    ) -> Self {
        self.with_info(set_name, param_name, ParamInfo::default())
    }

    pub fn with_info(
        mut self,
        set_name: &str,
        param_name: &str,
        info: ParamInfo,
    ) -> Self {
        self.insert(set_name, param_name, info);
        self
    }

    pub fn insert(
        &mut self,
        set_name: &str,
        param_name: &str,
        info: ParamInfo,
    ) {
        self.sets
            .entry(set_name.to_string())
            .or_default()
            .insert(param_name.to_string(), info);
    }

    /// Parses `set/name` or `name` entries, e.g. from [`crate::WatchConfig::parameters`]
    pub fn from_paths<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self::new();
        for path in paths {
            let path = path.as_ref();
            let key = keys::split(path)
                .ok_or_else(|| Error::InvalidConfig(format!("{path:?} is not a parameter path")))?;
            schema.insert(&key.set_name, &key.param_name, ParamInfo::default());
        }
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KnownParameters for ParamSchema {
    fn get(
        &self,
        set_name: &str,
        param_name: &str,
    ) -> Option<ParamInfo> {
        self.sets.get(set_name).and_then(|set| set.get(param_name)).copied()
    }

    fn keys(&self) -> Vec<ParamKey> {
        let mut keys: Vec<ParamKey> = self
            .sets
            .iter()
            .flat_map(|(set_name, params)| params.keys().map(move |name| ParamKey::new(set_name.clone(), name.clone())))
            .collect();
        keys.sort();
        keys
    }
}
