use std::fmt::{self, Write as _};

use super::Graph;
use crate::node::Edge;
use crate::stamp::Stamp;

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        for (id, info) in self.nodes.iter() {
            let mut line = format!("  {id} = {}", info.op.mnemonic());
            if !info.inputs.is_empty() {
                let inputs: Vec<String> = info.inputs.iter().map(|n| n.to_string()).collect();
                write!(line, "({})", inputs.join(", "))?;
            }
            for (edge, target) in info.edges() {
                let label = match edge {
                    Edge::Input(_) => continue,
                    Edge::Memory => "mem",
                    Edge::StateBefore => "before",
                    Edge::StateDuring => "during",
                    Edge::StateAfter => "after",
                    Edge::Outer => "outer",
                };
                write!(line, " {label}={target}")?;
            }
            if info.stamp != Stamp::Void {
                write!(line, " : {}", info.stamp)?;
            }
            if !info.successors.is_empty() {
                let succs: Vec<String> = info
                    .successors
                    .iter()
                    .map(|s| s.map(|n| n.to_string()).unwrap_or_else(|| "_".into()))
                    .collect();
                write!(line, " -> [{}]", succs.join(", "))?;
            }
            writeln!(f, "{line}")?;
        }
        write!(f, "}}")
    }
}
