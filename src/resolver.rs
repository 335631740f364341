use tracing::info;

use crate::gemini::{GenerativeBackend, ModelDescriptor};

pub const PRIORITY_MODELS: [&str; 6] = [
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-pro",
    "gemini-1.0-pro",
];

pub fn select_model(available: &[ModelDescriptor]) -> Option<ModelDescriptor> {
    PRIORITY_MODELS
        .iter()
        .find_map(|wanted| available.iter().find(|model| model.name == *wanted))
        .or_else(|| available.first())
        .cloned()
}

/// Catalog reordered by priority: listed priority models first, then the rest
/// in catalog order. The head is always `select_model(available)`.
pub fn rank_candidates(available: &[ModelDescriptor], limit: usize) -> Vec<ModelDescriptor> {
    let mut ranked: Vec<ModelDescriptor> = PRIORITY_MODELS
        .iter()
        .filter_map(|wanted| available.iter().find(|model| model.name == *wanted))
        .cloned()
        .collect();
    for model in available {
        if !ranked.iter().any(|picked| picked.name == model.name) {
            ranked.push(model.clone());
        }
    }
    ranked.truncate(limit);
    ranked
}

pub async fn resolve_working_model<B: GenerativeBackend>(backend: &B) -> Option<ModelDescriptor> {
    let listing = backend.list_models().await;
    let model = select_model(listing.models());
    if let Some(model) = &model {
        info!(model = %model.name, "using model");
    }
    model
}

pub async fn resolve_candidates<B: GenerativeBackend>(
    backend: &B,
    limit: usize,
) -> Vec<ModelDescriptor> {
    let listing = backend.list_models().await;
    rank_candidates(listing.models(), limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<ModelDescriptor> {
        names
            .iter()
            .map(|name| ModelDescriptor::new(*name, name.to_uppercase()))
            .collect()
    }

    #[test]
    fn respects_priority_order() {
        let models = catalog(&["gemini-pro", "gemini-1.5-pro-latest", "gemini-1.5-flash"]);
        assert_eq!(
            select_model(&models).map(|model| model.name),
            Some("gemini-1.5-pro-latest".to_string())
        );
    }

    #[test]
    fn falls_back_to_first_listed_model() {
        let models = catalog(&["gemini-2.0-flash-exp", "gemini-exp-1206"]);
        assert_eq!(
            select_model(&models).map(|model| model.name),
            Some("gemini-2.0-flash-exp".to_string())
        );
    }

    #[test]
    fn empty_catalog_resolves_to_none() {
        assert_eq!(select_model(&[]), None);
        assert!(rank_candidates(&[], 3).is_empty());
    }

    #[test]
    fn ranked_head_matches_selection() {
        let models = catalog(&[
            "gemini-2.0-flash-exp",
            "gemini-pro",
            "gemini-1.5-flash-latest",
            "gemini-1.5-pro",
        ]);
        let ranked = rank_candidates(&models, 3);
        let names: Vec<&str> = ranked.iter().map(|model| model.name.as_str()).collect();
        assert_eq!(names, ["gemini-1.5-flash-latest", "gemini-1.5-pro", "gemini-pro"]);
        assert_eq!(ranked.first(), select_model(&models).as_ref());
    }
}
