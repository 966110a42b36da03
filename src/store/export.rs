use super::{Node, Value};

pub const PRIVATE_KEY: &str = "private";
pub const LOCAL_KEY: &str = "local";

impl Node {
    pub fn is_private(&self) -> bool {
        self.entry_value(PRIVATE_KEY).and_then(Value::as_bool) == Some(true)
    }

    /// Builds a filtered copy for publishing.
    ///
    /// Nodes flagged `private: true` are left out unless
    /// `force_include_private` is set, and every `local` entry is exported as
    /// an empty node. `self` is never modified.
    pub fn export(&self, force_include_private: bool) -> Node {
        let mut exported = Node::new();
        if self.is_private() && !force_include_private {
            return exported;
        }
        for (key, value) in self.iter() {
            if key == LOCAL_KEY {
                exported.insert(key, Node::new());
            } else if let Some(value) = export_value(value, force_include_private) {
                exported.insert(key, value);
            }
        }
        exported
    }
}

fn export_value(value: &Value, force_include_private: bool) -> Option<Value> {
    match value {
        Value::Node(node) if node.is_private() && !force_include_private => None,
        Value::Node(node) => Some(Value::Node(node.export(force_include_private))),
        Value::Sequence(items) => Some(Value::Sequence(
            items
                .iter()
                .filter_map(|item| export_value(item, force_include_private))
                .collect(),
        )),
        primitive => Some(primitive.clone()),
    }
}
