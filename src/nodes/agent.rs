//! The agent attribution carried on every node mutation (§3: `history`).

/// Who asked for a node operation. `Operator` gets special treatment in
/// [`crate::nodes::manager::NodeLifecycleManager::deallocate`] (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Agent {
    System,
    Operator,
    Named(String),
}

impl Agent {
    pub fn is_operator(&self) -> bool {
        matches!(self, Agent::Operator)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Agent::System => "system",
            Agent::Operator => "operator",
            Agent::Named(name) => name,
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
