use std::collections::HashMap;

use anyhow::Result;

use crate::data::X;

/// Ordered, named collection of tensors flowing in and out of a session.
#[derive(Debug, Clone, Default)]
pub struct Xs {
    map: HashMap<String, X>,
    names: Vec<String>,
}

impl From<X> for Xs {
    fn from(x: X) -> Self {
        let mut xs = Self::default();
        xs.push(x);
        xs
    }
}

impl From<Vec<X>> for Xs {
    fn from(xs: Vec<X>) -> Self {
        let mut ys = Self::default();
        for x in xs {
            ys.push(x);
        }
        ys
    }
}

impl Xs {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends `x` under its positional index as key.
    pub fn push(&mut self, x: X) {
        let key = self.names.len().to_string();
        self.names.push(key.clone());
        self.map.insert(key, x);
    }

    pub fn push_kv(&mut self, key: &str, x: X) -> Result<()> {
        if self.map.contains_key(key) {
            anyhow::bail!("Xs already contains key: {key}");
        }
        self.names.push(key.to_string());
        self.map.insert(key.to_string(), x);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, key: &str) -> Option<&X> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Keeps the last `n` tensors, in order.
    pub fn last_n(self, n: usize) -> Result<Self> {
        if n > self.len() {
            anyhow::bail!("Requested the last {} tensors of {}", n, self.len());
        }
        let skip = self.len() - n;
        let mut ys = Xs::new();
        for (name, x) in self.into_named_iter().skip(skip) {
            ys.push_kv(&name, x)?;
        }
        Ok(ys)
    }

    pub fn iter(&self) -> impl Iterator<Item = &X> {
        self.names.iter().filter_map(|name| self.map.get(name))
    }

    pub fn into_named_iter(mut self) -> impl Iterator<Item = (String, X)> {
        self.names
            .into_iter()
            .filter_map(move |name| self.map.remove(&name).map(|x| (name, x)))
    }
}

impl IntoIterator for Xs {
    type Item = X;
    type IntoIter = std::vec::IntoIter<X>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_named_iter()
            .map(|(_, x)| x)
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl std::ops::Index<&str> for Xs {
    type Output = X;

    fn index(&self, key: &str) -> &Self::Output {
        self.map.get(key).unwrap_or_else(|| panic!("Index {key} was not found in Xs"))
    }
}

impl std::ops::Index<usize> for Xs {
    type Output = X;

    fn index(&self, index: usize) -> &Self::Output {
        self.names
            .get(index)
            .and_then(|key| self.map.get(key))
            .unwrap_or_else(|| panic!("Index {index} is out of bounds in Xs"))
    }
}
