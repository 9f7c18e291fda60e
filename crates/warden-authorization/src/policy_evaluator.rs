//! ABAC policy engine.
//!
//! Evaluates every rule bound to a feature and collects all violations rather
//! than stopping at the first. A feature without rules is ABAC-exempt.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::FeatureId;
use warden_db::models::{Feature, PolicyRule, RouteFeature, User};
use warden_db::{DbResult, FeatureRepository, PolicyRepository};

use crate::abac::{evaluate_rule, user_attributes, RuleOutcome};
use crate::error::Result;
use crate::types::Violation;

/// Lookups the policy engine and route resolution need from storage.
#[async_trait]
pub trait PolicyResolver: Send + Sync {
    async fn route_feature(&self, path: &str, method: &str) -> DbResult<Option<RouteFeature>>;

    async fn feature_by_id(&self, id: FeatureId) -> DbResult<Option<Feature>>;

    async fn policies_for(&self, feature_id: FeatureId) -> DbResult<Vec<PolicyRule>>;
}

#[async_trait]
impl<S> PolicyResolver for S
where
    S: FeatureRepository + PolicyRepository + ?Sized,
{
    async fn route_feature(&self, path: &str, method: &str) -> DbResult<Option<RouteFeature>> {
        self.find_route_feature(path, method).await
    }

    async fn feature_by_id(&self, id: FeatureId) -> DbResult<Option<Feature>> {
        self.find_feature_by_id(id).await
    }

    async fn policies_for(&self, feature_id: FeatureId) -> DbResult<Vec<PolicyRule>> {
        self.find_policies_for_feature(feature_id).await
    }
}

/// Result of evaluating a feature's rules for one user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbacDecision {
    /// One entry per violated rule.
    pub violations: Vec<Violation>,
}

impl AbacDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Distinct violated attribute names, in rule order.
    #[must_use]
    pub fn violated_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for v in &self.violations {
            if !names.contains(&v.attribute.as_str()) {
                names.push(&v.attribute);
            }
        }
        names
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    resolver: Arc<dyn PolicyResolver>,
}

impl PolicyEngine {
    pub fn new(resolver: Arc<dyn PolicyResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<dyn PolicyResolver> {
        &self.resolver
    }

    /// Rules bound to the feature.
    pub async fn policies_for(&self, feature: &Feature) -> Result<Vec<PolicyRule>> {
        Ok(self.resolver.policies_for(feature.id).await?)
    }

    /// Evaluate the given rules; pure, no I/O.
    #[must_use]
    pub fn evaluate(&self, user: &User, feature: &Feature, policies: &[PolicyRule]) -> AbacDecision {
        if policies.is_empty() {
            return AbacDecision::default();
        }

        let attributes = user_attributes(user);
        let violations = policies
            .iter()
            .filter_map(|rule| match evaluate_rule(&attributes, rule) {
                RuleOutcome::Satisfied => None,
                RuleOutcome::Violated { actual } => Some(Violation {
                    policy_id: rule.id,
                    feature_id: feature.id,
                    attribute: rule.attribute.clone(),
                    expected: rule.value.clone(),
                    actual,
                }),
            })
            .collect::<Vec<_>>();

        if !violations.is_empty() {
            tracing::debug!(
                target: "authorization",
                user_id = %user.id,
                feature = %feature.name,
                violations = violations.len(),
                "ABAC rules violated"
            );
        }

        AbacDecision { violations }
    }

    /// Load the feature's rules and evaluate them.
    pub async fn evaluate_feature(&self, user: &User, feature: &Feature) -> Result<AbacDecision> {
        let policies = self.policies_for(feature).await?;
        Ok(self.evaluate(user, feature, &policies))
    }
}
