//! One-line-per-item summaries of persisted rule-set blocks.

use parallax_rules::{ModificationRule, RuleSetBlock, TrailingBlock};

fn describe_rule(index: usize, rule: &ModificationRule) -> String {
    let mut line = format!(
        "rule {index}: registers={} op={} transpose={}",
        rule.register_count, rule.operation, rule.transpose
    );
    if rule.uses_name() {
        line += &format!(" name={:?} ({:?})", rule.constant_name, rule.name_match);
    }
    if let Some(start) = rule.start_register {
        line += &format!(" start={start}");
    }
    if let Some(slot) = rule.buffer_index {
        line += &format!(" buffer_index={slot}");
    }
    if let Some(size) = rule.buffer_size {
        line += &format!(" buffer_size={size}");
    }
    line
}

/// Summarizes every decoded section of `block`, ending with where decoding stopped.
pub fn summarize(block: &RuleSetBlock) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(config) = &block.config {
        lines.push(format!(
            "config: ipd={} world_scale={} convergence={} fov_h={} aspect={} roll={:?} axis={:?}",
            config.ipd,
            config.world_scale,
            config.convergence,
            config.fov_h,
            config.aspect_multiplier,
            config.roll_impl,
            config.separation_axis,
        ));
        lines.push(format!(
            "config: squash={} gui_depth={} hud_distance={} hud_depth={}",
            config.squash, config.gui_depth, config.hud_distance, config.hud_depth,
        ));
    }

    if let Some(rules) = &block.rules {
        lines.push(format!("rules: {}", rules.len()));
        lines.extend(rules.iter().enumerate().map(|(i, rule)| describe_rule(i, rule)));
    }

    if let Some(indices) = &block.global_indices {
        lines.push(format!("global indices: {indices:?}"));
    }

    match &block.trailing {
        Some(TrailingBlock::FetchedShaders(hashes)) => {
            let hashes: Vec<String> = hashes.iter().map(ToString::to_string).collect();
            lines.push(format!("fetched shaders: [{}]", hashes.join(", ")));
        }
        Some(TrailingBlock::ShaderRules(pairs)) => {
            lines.push(format!("shader rules: {}", pairs.len()));
            lines.extend(
                pairs
                    .iter()
                    .map(|pair| format!("  {} -> rule {}", pair.hash, pair.rule_index)),
            );
        }
        None => {}
    }

    lines.push(match &block.error {
        Some(err) => format!("stopped: {err}"),
        None => "complete".to_owned(),
    });
    lines
}

#[cfg(test)]
mod tests {
    use parallax_rules::{RuleSetFlavor, ShaderHash, StereoConfig};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_input_reports_where_it_stopped() {
        let block = RuleSetBlock::parse(&[], RuleSetFlavor::ConstantBuffers);
        let lines = summarize(&block);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("stopped: configuration section truncated"));
    }

    #[test]
    fn full_block_lists_every_section() {
        let mut rule = ModificationRule::matrix_named("ViewProj", 2);
        rule.buffer_index = Some(1);
        let block = RuleSetBlock {
            config: Some(StereoConfig::default()),
            rules: Some(vec![rule]),
            global_indices: Some(vec![0]),
            trailing: Some(TrailingBlock::FetchedShaders(vec![ShaderHash(0xabc)])),
            error: None,
        };

        let lines = summarize(&block);
        assert_eq!(
            lines[2..],
            [
                "rules: 1".to_owned(),
                "rule 0: registers=4 op=2 transpose=false name=\"ViewProj\" (Exact) buffer_index=1"
                    .to_owned(),
                "global indices: [0]".to_owned(),
                "fetched shaders: [0x00000abc]".to_owned(),
                "complete".to_owned(),
            ]
        );
    }
}
