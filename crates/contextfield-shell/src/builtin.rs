//! Built-in protocol shells shipped with every field manager.

use crate::parser::parse_shell;
use crate::shell::ProtocolShell;
use contextfield_core::{Error, Result};

pub const NEURAL_FIELD_PROCESS: &str = r#"/neural.field.process{
    intent:="Process input through the field: measure, resonate, surface residues and respond",
    input:={
        query="<query>",
        field_state="<default>"
    },
    process:=[
        /field.measure{},
        /attractor.identify{threshold=0.0, limit=5},
        /resonance.measure{},
        /residue.surface{},
        /pattern.detect{},
        /field.evolve{time_delta=1.0},
        /response.generate{top_n=3}
    ],
    output:={
        field_metrics="<field_metrics>",
        identified_attractors="<identified_attractors>",
        resonance_scores="<resonance_scores>",
        surfaced_residues="<surfaced_residues>",
        detected_patterns="<detected_patterns>",
        field_evolution="<field_evolution>",
        response="<response>"
    },
    meta:={
        version="1.0.0",
        category="field"
    }
}
"#;

pub const FIELD_RESONANCE_SCAFFOLD: &str = r#"/field.resonance.scaffold{
    intent:="Bridge strongly resonating attractors, reinforce coherent links and damp weak ones",
    input:={
        target_patterns="<default>",
        query="<default>"
    },
    process:=[
        /pattern.detect{},
        /resonance.scaffold{},
        /resonance.amplify{factor=1.2},
        /resonance.dampen{threshold=0.3, factor=0.8},
        /field.tune{resonance_bandwidth=0.6},
        /field.audit{}
    ],
    output:={
        detected_patterns="<detected_patterns>",
        resonance_scaffold="<resonance_scaffold>",
        resonance_amplification="<resonance_amplification>",
        resonance_dampening="<resonance_dampening>",
        field_tuning="<field_tuning>",
        field_audit="<field_audit>"
    },
    meta:={
        version="1.0.0",
        category="resonance"
    }
}
"#;

pub const ATTRACTOR_CO_EMERGE: &str = r#"/attractor.co.emerge{
    intent:="Let existing attractors and surfaced residues co-emerge, then integrate the result",
    input:={
        query="<default>"
    },
    process:=[
        /attractor.scan{threshold=0.3, limit=10},
        /residue.surface{},
        /co.emerge{threshold=0.2},
        /field.audit{},
        /agency.self_prompt{limit=3},
        /integration.protocol{merge_threshold=0.8, integrate_threshold=0.3},
        /boundary.collapse{}
    ],
    output:={
        attractors="<attractors>",
        surfaced_residues="<surfaced_residues>",
        co_emergent_attractors="<co_emergent_attractors>",
        field_audit="<field_audit>",
        self_prompts="<self_prompts>",
        integration="<integration>",
        boundary="<boundary>"
    },
    meta:={
        version="1.0.0",
        category="emergence"
    }
}
"#;

pub const BUILTIN_NAMES: [&str; 3] = [
    "neural.field.process",
    "field.resonance.scaffold",
    "attractor.co.emerge",
];

pub fn builtin_source(name: &str) -> Option<&'static str> {
    match name {
        "neural.field.process" => Some(NEURAL_FIELD_PROCESS),
        "field.resonance.scaffold" => Some(FIELD_RESONANCE_SCAFFOLD),
        "attractor.co.emerge" => Some(ATTRACTOR_CO_EMERGE),
        _ => None,
    }
}

pub fn builtin_shell(name: &str) -> Result<ProtocolShell> {
    let source = builtin_source(name).ok_or_else(|| {
        Error::invalid_parameter(
            "shell",
            format!("no built-in shell named '{}' (known: {})", name, BUILTIN_NAMES.join(", ")),
        )
    })?;
    parse_shell(source)
}

pub fn builtin_shells() -> Result<Vec<ProtocolShell>> {
    BUILTIN_NAMES.iter().map(|name| builtin_shell(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Operation;

    #[test]
    fn builtins_parse_with_expected_sequences() {
        let shell = builtin_shell("neural.field.process").unwrap();
        assert_eq!(
            shell.operation_names(),
            vec![
                "field.measure",
                "attractor.identify",
                "resonance.measure",
                "residue.surface",
                "pattern.detect",
                "field.evolve",
                "response.generate"
            ]
        );
        let shell = builtin_shell("field.resonance.scaffold").unwrap();
        assert_eq!(
            shell.operation_names(),
            vec![
                "pattern.detect",
                "resonance.scaffold",
                "resonance.amplify",
                "resonance.dampen",
                "field.tune",
                "field.audit"
            ]
        );
        let shell = builtin_shell("attractor.co.emerge").unwrap();
        assert_eq!(
            shell.operation_names(),
            vec![
                "attractor.scan",
                "residue.surface",
                "co.emerge",
                "field.audit",
                "agency.self_prompt",
                "integration.protocol",
                "boundary.collapse"
            ]
        );
    }

    #[test]
    fn every_builtin_operation_is_registered() {
        for shell in builtin_shells().unwrap() {
            assert_eq!(shell.name, shell.name.trim());
            for name in shell.operation_names() {
                assert!(Operation::from_name(&name).is_some(), "{} in {}", name, shell.name);
            }
        }
    }

    #[test]
    fn unknown_builtin() {
        assert!(builtin_source("nope").is_none());
        assert!(builtin_shell("nope").is_err());
    }
}
