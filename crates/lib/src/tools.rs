//! Static tool panel descriptors. Configuration, not user data.

/// One entry in the auxiliary tool panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolWindow {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

pub const TOOL_WINDOWS: &[ToolWindow] = &[
    ToolWindow {
        id: "hyperparameter_tuning",
        name: "Hyperparameter Tuning",
        description: "Fine-tune LLM parameters",
        icon: "Sliders",
    },
    ToolWindow {
        id: "documentation_explorer",
        name: "Documentation Explorer",
        description: "Browse and search documentation",
        icon: "BookOpen",
    },
];

/// Look up a tool window by id.
pub fn tool_window(id: &str) -> Option<&'static ToolWindow> {
    TOOL_WINDOWS.iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_resolvable() {
        for (i, tool) in TOOL_WINDOWS.iter().enumerate() {
            assert_eq!(tool_window(tool.id), Some(tool));
            assert!(TOOL_WINDOWS[i + 1..].iter().all(|t| t.id != tool.id));
        }
        assert!(tool_window("missing").is_none());
    }
}
