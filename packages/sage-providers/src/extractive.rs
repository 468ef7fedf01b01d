//! Model-free answer generation.
//!
//! Stitches the retrieved passages into an answer with `[n]` citations. Customers get the
//! lead sentence of the best few passages; engineers and admins get the passages in full.

use unicode_segmentation::UnicodeSegmentation;

use sage_domain::Role;

pub const EXTRACTIVE_MODEL_ID: &str = "extractive-v1";

const CUSTOMER_MAX_PASSAGES: usize = 3;

pub fn compose(role: Role, query: &str, passages: &[String]) -> String {
	let mut out = match role {
		Role::Customer => "Here is what our maintenance guides suggest:".to_string(),
		Role::Engineer => format!("Technical notes for \"{}\":", query.trim()),
		Role::Admin => format!("Knowledge base findings for \"{}\":", query.trim()),
	};

	for (index, passage) in passages.iter().enumerate() {
		let body = match role {
			Role::Customer if index >= CUSTOMER_MAX_PASSAGES => break,
			Role::Customer => lead_sentence(passage),
			Role::Engineer | Role::Admin => passage.trim(),
		};

		if body.is_empty() {
			continue;
		}

		out.push_str(&format!("\n- {body} [{}]", index + 1));
	}

	if role == Role::Customer {
		out.push_str("\nIf the problem persists, please contact support.");
	}

	out
}

fn lead_sentence(text: &str) -> &str {
	text.split_sentence_bounds().map(str::trim).find(|sentence| !sentence.is_empty()).unwrap_or("")
}
