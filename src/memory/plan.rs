//! Per-intent retrieval planning.

use super::intent::Intent;
use super::store::StoreId;
use crate::query::{ExperienceLevel, UserFacets};
use serde::{Deserialize, Serialize};

/// How far back a retrieval should reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Recent,
    All,
}

/// Which corpora to query, how deep, and whether the answer must be
/// cross-checked against the retrieved support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    /// Store → top-k, in stable store order.
    pub stores: Vec<(StoreId, usize)>,
    pub horizon: TimeHorizon,
    pub needs_verification: bool,
    /// Score mass treated as "fully supported"; the aggregate relevance is
    /// the retrieved score sum normalised by this.
    pub expected_minimum: f32,
}

impl RetrievalPlan {
    /// Build the plan for an intent, refined with user facets.
    pub fn for_intent(intent: Intent, facets: &UserFacets) -> Self {
        let (mut stores, horizon, needs_verification): (Vec<(StoreId, usize)>, _, _) =
            match intent {
                Intent::HistoricalReference => {
                    (vec![(StoreId::Conversations, 5)], TimeHorizon::Recent, false)
                }
                Intent::EducationalQuery => {
                    (vec![(StoreId::Education, 5)], TimeHorizon::All, false)
                }
                Intent::MarketAnalysis => (
                    vec![(StoreId::Education, 4), (StoreId::Market, 4)],
                    TimeHorizon::Recent,
                    false,
                ),
                Intent::PortfolioAdvice => (
                    vec![
                        (StoreId::Conversations, 3),
                        (StoreId::Education, 3),
                        (StoreId::Market, 3),
                    ],
                    TimeHorizon::Recent,
                    true,
                ),
                Intent::RiskAssessment => (
                    vec![(StoreId::Conversations, 3), (StoreId::Education, 3)],
                    TimeHorizon::All,
                    true,
                ),
                Intent::GeneralChat => (vec![(StoreId::Education, 2)], TimeHorizon::All, false),
            };

        // Beginners get one extra educational fragment.
        if facets.experience == Some(ExperienceLevel::Beginner) {
            for (store, k) in stores.iter_mut() {
                if *store == StoreId::Education {
                    *k = (*k + 1).min(10);
                }
            }
        }

        // An attached document always joins the plan.
        if facets.attached_document.is_some() {
            stores.push((StoreId::Documents, 3));
        }

        let total_k: usize = stores.iter().map(|(_, k)| *k).sum();
        Self {
            stores,
            horizon,
            needs_verification,
            expected_minimum: total_k as f32 * 0.5,
        }
    }

    pub fn queries_store(&self, id: StoreId) -> bool {
        self.stores.iter().any(|(store, _)| *store == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    #[rstest]
    #[case(Intent::HistoricalReference, vec![(StoreId::Conversations, 5)], TimeHorizon::Recent, false)]
    #[case(Intent::EducationalQuery, vec![(StoreId::Education, 5)], TimeHorizon::All, false)]
    #[case(Intent::MarketAnalysis, vec![(StoreId::Education, 4), (StoreId::Market, 4)], TimeHorizon::Recent, false)]
    #[case(
        Intent::PortfolioAdvice,
        vec![(StoreId::Conversations, 3), (StoreId::Education, 3), (StoreId::Market, 3)],
        TimeHorizon::Recent,
        true
    )]
    #[case(Intent::RiskAssessment, vec![(StoreId::Conversations, 3), (StoreId::Education, 3)], TimeHorizon::All, true)]
    #[case(Intent::GeneralChat, vec![(StoreId::Education, 2)], TimeHorizon::All, false)]
    fn intent_table(
        #[case] intent: Intent,
        #[case] stores: Vec<(StoreId, usize)>,
        #[case] horizon: TimeHorizon,
        #[case] needs_verification: bool,
    ) {
        let plan = RetrievalPlan::for_intent(intent, &UserFacets::default());
        assert_eq!(plan.stores, stores);
        assert_eq!(plan.horizon, horizon);
        assert_eq!(plan.needs_verification, needs_verification);
    }

    #[test]
    fn attached_document_adds_documents_store() {
        let facets = UserFacets {
            attached_document: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let plan = RetrievalPlan::for_intent(Intent::EducationalQuery, &facets);
        assert!(plan.queries_store(StoreId::Documents));
        assert!(
            plan.stores
                .iter()
                .any(|(s, k)| *s == StoreId::Documents && *k == 3)
        );
    }

    #[test]
    fn beginner_bumps_education_depth() {
        let facets = UserFacets {
            experience: Some(ExperienceLevel::Beginner),
            ..Default::default()
        };
        let plan = RetrievalPlan::for_intent(Intent::EducationalQuery, &facets);
        assert_eq!(plan.stores, vec![(StoreId::Education, 6)]);
    }

    #[test]
    fn expected_minimum_tracks_total_depth() {
        let plan = RetrievalPlan::for_intent(Intent::PortfolioAdvice, &UserFacets::default());
        assert!((plan.expected_minimum - 4.5).abs() < f32::EPSILON);
    }
}
