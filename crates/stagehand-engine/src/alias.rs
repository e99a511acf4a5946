//! Configured engine aliases and their chains.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::ResolveError;
use crate::reference::EngineReference;

/// Role an engine plays; an alias is only valid for the role it is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineRole {
    Builder,
    Testenv,
    TestRunner,
}

impl EngineRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineRole::Builder => "builder",
            EngineRole::Testenv => "testenv",
            EngineRole::TestRunner => "test-runner",
        }
    }
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a chain: the engine plus its opaque configuration blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub engine: EngineReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Document>,
}

impl ChainEntry {
    pub fn new(engine: EngineReference) -> Self {
        Self { engine, spec: None }
    }

    pub fn with_spec(mut self, spec: Document) -> Self {
        self.spec = Some(spec);
        self
    }
}

/// An `engines:` entry in project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDefinition {
    pub alias: String,
    #[serde(rename = "type")]
    pub role: EngineRole,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builder: Vec<ChainEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testenv: Vec<ChainEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_runner: Vec<ChainEntry>,
}

impl AliasDefinition {
    pub fn new(alias: impl Into<String>, role: EngineRole, chain: Vec<ChainEntry>) -> Self {
        let mut def = Self {
            alias: alias.into(),
            role,
            builder: Vec::new(),
            testenv: Vec::new(),
            test_runner: Vec::new(),
        };
        match role {
            EngineRole::Builder => def.builder = chain,
            EngineRole::Testenv => def.testenv = chain,
            EngineRole::TestRunner => def.test_runner = chain,
        }
        def
    }

    /// The chain matching this alias's own role.
    pub fn chain(&self) -> &[ChainEntry] {
        match self.role {
            EngineRole::Builder => &self.builder,
            EngineRole::Testenv => &self.testenv,
            EngineRole::TestRunner => &self.test_runner,
        }
    }
}

/// Alias lookup table, read-only once built.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    by_name: BTreeMap<String, AliasDefinition>,
}

impl AliasRegistry {
    pub fn new(definitions: impl IntoIterator<Item = AliasDefinition>) -> Self {
        Self {
            by_name: definitions
                .into_iter()
                .map(|d| (d.alias.clone(), d))
                .collect(),
        }
    }

    pub fn get(&self, alias: &str) -> Option<&AliasDefinition> {
        self.by_name.get(alias)
    }

    /// Resolve `alias` to its chain for `role`.
    ///
    /// Unknown aliases, role mismatches, empty chains and chains that point
    /// at further aliases are all errors; nothing resolves to an empty chain.
    pub fn lookup(&self, alias: &str, role: EngineRole) -> Result<&[ChainEntry], ResolveError> {
        let def = self
            .by_name
            .get(alias)
            .ok_or_else(|| ResolveError::UnknownAlias(alias.to_string()))?;
        if def.role != role {
            return Err(ResolveError::WrongRole {
                alias: alias.to_string(),
                expected: role.to_string(),
                actual: def.role.to_string(),
            });
        }
        let chain = def.chain();
        if chain.is_empty() {
            return Err(ResolveError::EmptyChain(alias.to_string()));
        }
        if let Some(nested) = chain.iter().find(|e| e.engine.is_alias()) {
            return Err(ResolveError::NestedAlias {
                alias: alias.to_string(),
                nested: nested.engine.to_string(),
            });
        }
        Ok(chain)
    }
}
