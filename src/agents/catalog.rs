//! The closed agent catalogue and its dependency graph.

use crate::provider::{FieldKind, SchemaDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// The closed set of specialised reasoning agents.
///
/// The derived `Ord` is the stable total order used everywhere ties must
/// break deterministically (stage-internal ordering, synthesis headings).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    MarketAnalyst,
    TechnicalAnalysis,
    NewsSentiment,
    EconomicAnalysis,
    Education,
    EarningsAnalysis,
    DividendAnalysis,
    PsychologicalProfiling,
    RiskAssessment,
    Behavioral,
    PortfolioOptimizer,
    TaxAdvisor,
    CostAnalyzer,
}

impl AgentType {
    pub const ALL: [AgentType; 13] = [
        AgentType::MarketAnalyst,
        AgentType::TechnicalAnalysis,
        AgentType::NewsSentiment,
        AgentType::EconomicAnalysis,
        AgentType::Education,
        AgentType::EarningsAnalysis,
        AgentType::DividendAnalysis,
        AgentType::PsychologicalProfiling,
        AgentType::RiskAssessment,
        AgentType::Behavioral,
        AgentType::PortfolioOptimizer,
        AgentType::TaxAdvisor,
        AgentType::CostAnalyzer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyst => "market_analyst",
            AgentType::TechnicalAnalysis => "technical_analysis",
            AgentType::NewsSentiment => "news_sentiment",
            AgentType::EconomicAnalysis => "economic_analysis",
            AgentType::Education => "education",
            AgentType::EarningsAnalysis => "earnings_analysis",
            AgentType::DividendAnalysis => "dividend_analysis",
            AgentType::PsychologicalProfiling => "psychological_profiling",
            AgentType::RiskAssessment => "risk_assessment",
            AgentType::Behavioral => "behavioral",
            AgentType::PortfolioOptimizer => "portfolio_optimizer",
            AgentType::TaxAdvisor => "tax_advisor",
            AgentType::CostAnalyzer => "cost_analyzer",
        }
    }

    /// Heading used in synthesised answers.
    pub fn label(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyst => "Market Analyst",
            AgentType::TechnicalAnalysis => "Technical Analysis",
            AgentType::NewsSentiment => "News Sentiment",
            AgentType::EconomicAnalysis => "Economic Analysis",
            AgentType::Education => "Education",
            AgentType::EarningsAnalysis => "Earnings Analysis",
            AgentType::DividendAnalysis => "Dividend Analysis",
            AgentType::PsychologicalProfiling => "Psychological Profiling",
            AgentType::RiskAssessment => "Risk Assessment",
            AgentType::Behavioral => "Behavioral Insights",
            AgentType::PortfolioOptimizer => "Portfolio Optimizer",
            AgentType::TaxAdvisor => "Tax Advisor",
            AgentType::CostAnalyzer => "Cost Analyzer",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the orchestrator needs to compose one agent generically.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub agent: AgentType,
    pub description: &'static str,
    pub depends_on: BTreeSet<AgentType>,
    /// Role preamble rendered at the top of the agent's prompt.
    pub role_prompt: &'static str,
    /// Full output schema: the shared base fields plus agent-specific ones.
    pub output_schema: SchemaDescriptor,
    /// Market-data tools this agent may call during its own LLM turn.
    pub tools: &'static [&'static str],
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{agent}' depends on '{dependency}', which is not in the registry")]
    UnknownDependency {
        agent: AgentType,
        dependency: AgentType,
    },
    #[error("dependency cycle involving agents {0:?}")]
    DependencyCycle(Vec<AgentType>),
    #[error("agent '{0}' is declared twice")]
    DuplicateAgent(AgentType),
}

/// The process-wide catalogue of agents.
///
/// Construction validates the dependency graph: unknown references,
/// duplicates, and cycles are initialisation errors, so no turn can ever
/// observe a malformed catalogue.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    specs: BTreeMap<AgentType, AgentSpec>,
}

impl AgentRegistry {
    pub fn new(specs: Vec<AgentSpec>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for spec in specs {
            let agent = spec.agent;
            if map.insert(agent, spec).is_some() {
                return Err(RegistryError::DuplicateAgent(agent));
            }
        }

        for spec in map.values() {
            for dependency in &spec.depends_on {
                if !map.contains_key(dependency) {
                    return Err(RegistryError::UnknownDependency {
                        agent: spec.agent,
                        dependency: *dependency,
                    });
                }
            }
        }

        Self::check_acyclic(&map)?;
        Ok(Self { specs: map })
    }

    /// Kahn's algorithm; whatever cannot be peeled off is part of a cycle.
    fn check_acyclic(specs: &BTreeMap<AgentType, AgentSpec>) -> Result<(), RegistryError> {
        let mut in_degree: BTreeMap<AgentType, usize> = specs
            .values()
            .map(|s| (s.agent, s.depends_on.len()))
            .collect();
        let mut ready: Vec<AgentType> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(a, _)| *a)
            .collect();
        let mut removed = 0usize;

        while let Some(done) = ready.pop() {
            removed += 1;
            for spec in specs.values() {
                if spec.depends_on.contains(&done) {
                    let degree = in_degree
                        .get_mut(&spec.agent)
                        .expect("every agent has an in-degree");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(spec.agent);
                    }
                }
            }
        }

        if removed != specs.len() {
            let cyclic: Vec<AgentType> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(a, _)| *a)
                .collect();
            return Err(RegistryError::DependencyCycle(cyclic));
        }
        Ok(())
    }

    /// The canonical catalogue.
    pub fn standard() -> Self {
        Self::new(standard_specs()).expect("canonical agent catalogue is acyclic")
    }

    pub fn spec(&self, agent: AgentType) -> Option<&AgentSpec> {
        self.specs.get(&agent)
    }

    pub fn contains(&self, agent: AgentType) -> bool {
        self.specs.contains_key(&agent)
    }

    pub fn depends_on(&self, agent: AgentType) -> Option<&BTreeSet<AgentType>> {
        self.specs.get(&agent).map(|s| &s.depends_on)
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentType> + '_ {
        self.specs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Shared base fields every agent must return.
fn base_schema(name: &str) -> SchemaDescriptor {
    SchemaDescriptor::new(name)
        .field("analysis", "prose analysis of the question", FieldKind::Text, true)
        .field(
            "recommendation",
            "short action statement",
            FieldKind::Text,
            true,
        )
        .field(
            "confidence",
            "certainty in the recommendation",
            FieldKind::Number {
                min: Some(0.0),
                max: Some(100.0),
            },
            true,
        )
        .field(
            "sources_used",
            "which knowledge informed the answer",
            FieldKind::TextList,
            true,
        )
}

fn trend_labels() -> Vec<String> {
    ["bullish", "bearish", "neutral"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn deps(agents: &[AgentType]) -> BTreeSet<AgentType> {
    agents.iter().copied().collect()
}

/// The canonical thirteen specs with the tiered dependency DAG.
fn standard_specs() -> Vec<AgentSpec> {
    vec![
        AgentSpec {
            agent: AgentType::MarketAnalyst,
            description: "Broad market conditions and positioning",
            depends_on: BTreeSet::new(),
            role_prompt: "You are a market analyst. Assess current market conditions \
                          relevant to the question.",
            output_schema: base_schema("market_analyst").field(
                "outlook",
                "overall market stance",
                FieldKind::Enumeration(trend_labels()),
                true,
            ),
            tools: &["get_quote", "get_history"],
        },
        AgentSpec {
            agent: AgentType::TechnicalAnalysis,
            description: "Price action, momentum and chart structure",
            depends_on: BTreeSet::new(),
            role_prompt: "You are a technical analyst. Read price structure, momentum \
                          and volume for the instruments in question.",
            output_schema: base_schema("technical_analysis").field(
                "trend",
                "prevailing price trend",
                FieldKind::Enumeration(trend_labels()),
                true,
            ),
            tools: &["get_quote", "get_history"],
        },
        AgentSpec {
            agent: AgentType::NewsSentiment,
            description: "Tone of recent coverage around the instruments",
            depends_on: BTreeSet::new(),
            role_prompt: "You analyse news flow and its sentiment for the assets under \
                          discussion.",
            output_schema: base_schema("news_sentiment").field(
                "sentiment",
                "net tone of recent coverage",
                FieldKind::Enumeration(
                    ["positive", "negative", "mixed"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                true,
            ),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::EconomicAnalysis,
            description: "Macro backdrop: rates, inflation, growth",
            depends_on: BTreeSet::new(),
            role_prompt: "You are a macro economist. Relate the macro backdrop to the \
                          question.",
            output_schema: base_schema("economic_analysis"),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::Education,
            description: "Plain-language explanations of financial concepts",
            depends_on: BTreeSet::new(),
            role_prompt: "You are a patient financial educator. Explain the concepts \
                          involved at the user's level, without giving directives.",
            output_schema: base_schema("education").field(
                "key_terms",
                "terms worth defining for the user",
                FieldKind::TextList,
                false,
            ),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::EarningsAnalysis,
            description: "Earnings quality, surprises and guidance",
            depends_on: BTreeSet::new(),
            role_prompt: "You analyse company earnings relevant to the question.",
            output_schema: base_schema("earnings_analysis"),
            tools: &["get_fundamentals"],
        },
        AgentSpec {
            agent: AgentType::DividendAnalysis,
            description: "Dividend safety, yield and growth",
            depends_on: BTreeSet::new(),
            role_prompt: "You analyse dividend sustainability and income characteristics.",
            output_schema: base_schema("dividend_analysis"),
            tools: &["get_fundamentals"],
        },
        AgentSpec {
            agent: AgentType::PsychologicalProfiling,
            description: "The investor's decision style and biases",
            depends_on: BTreeSet::new(),
            role_prompt: "You profile the investor's likely decision style from the \
                          conversation, without diagnosing.",
            output_schema: base_schema("psychological_profiling"),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::RiskAssessment,
            description: "Downside scenarios given market, technical and macro reads",
            depends_on: deps(&[
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::EconomicAnalysis,
            ]),
            role_prompt: "You are a risk officer. Weigh the upstream analyses into a \
                          risk picture for the user's situation.",
            output_schema: base_schema("risk_assessment").field(
                "risk_level",
                "overall risk classification",
                FieldKind::Enumeration(
                    ["low", "moderate", "elevated", "high"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                true,
            ),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::Behavioral,
            description: "Behavioural framing tailored to the investor profile",
            depends_on: deps(&[AgentType::PsychologicalProfiling]),
            role_prompt: "You translate the investor profile into behavioural guidance: \
                          biases to watch, framing that will land.",
            output_schema: base_schema("behavioral"),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::PortfolioOptimizer,
            description: "Allocation changes consistent with the risk picture",
            depends_on: deps(&[AgentType::RiskAssessment]),
            role_prompt: "You are a portfolio strategist. Propose allocation changes \
                          consistent with the risk assessment and the user's tolerance.",
            output_schema: base_schema("portfolio_optimizer").field(
                "allocation_summary",
                "one-line summary of the proposed allocation",
                FieldKind::Text,
                false,
            ),
            tools: &["get_quote"],
        },
        AgentSpec {
            agent: AgentType::TaxAdvisor,
            description: "Tax consequences of the proposed changes",
            depends_on: deps(&[AgentType::PortfolioOptimizer]),
            role_prompt: "You flag the tax considerations of the proposed portfolio \
                          changes. General considerations only, not jurisdiction advice.",
            output_schema: base_schema("tax_advisor").field(
                "considerations",
                "tax points the user should check",
                FieldKind::TextList,
                false,
            ),
            tools: &[],
        },
        AgentSpec {
            agent: AgentType::CostAnalyzer,
            description: "Fees, spreads and friction of the proposed changes",
            depends_on: deps(&[AgentType::PortfolioOptimizer]),
            role_prompt: "You estimate the costs (fees, spreads, friction) of executing \
                          the proposed changes.",
            output_schema: base_schema("cost_analyzer"),
            tools: &[],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_all_thirteen() {
        let registry = AgentRegistry::standard();
        assert_eq!(registry.len(), 13);
        for agent in AgentType::ALL {
            assert!(registry.contains(agent));
        }
    }

    #[test]
    fn canonical_tiers_are_as_declared() {
        let registry = AgentRegistry::standard();
        assert!(registry.depends_on(AgentType::MarketAnalyst).unwrap().is_empty());
        assert_eq!(
            registry.depends_on(AgentType::RiskAssessment).unwrap(),
            &deps(&[
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::EconomicAnalysis
            ])
        );
        assert_eq!(
            registry.depends_on(AgentType::PortfolioOptimizer).unwrap(),
            &deps(&[AgentType::RiskAssessment])
        );
        assert_eq!(
            registry.depends_on(AgentType::TaxAdvisor).unwrap(),
            &deps(&[AgentType::PortfolioOptimizer])
        );
        assert_eq!(
            registry.depends_on(AgentType::Behavioral).unwrap(),
            &deps(&[AgentType::PsychologicalProfiling])
        );
    }

    #[test]
    fn cyclic_registry_is_rejected_at_construction() {
        let mut spec_a = AgentRegistry::standard()
            .spec(AgentType::MarketAnalyst)
            .unwrap()
            .clone();
        let mut spec_b = AgentRegistry::standard()
            .spec(AgentType::TechnicalAnalysis)
            .unwrap()
            .clone();
        spec_a.depends_on = deps(&[AgentType::TechnicalAnalysis]);
        spec_b.depends_on = deps(&[AgentType::MarketAnalyst]);

        let err = AgentRegistry::new(vec![spec_a, spec_b]).unwrap_err();
        assert!(matches!(err, RegistryError::DependencyCycle(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut spec = AgentRegistry::standard()
            .spec(AgentType::MarketAnalyst)
            .unwrap()
            .clone();
        spec.depends_on = deps(&[AgentType::RiskAssessment]);
        let err = AgentRegistry::new(vec![spec]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDependency { .. }));
    }

    #[test]
    fn every_schema_carries_the_base_fields() {
        let registry = AgentRegistry::standard();
        for agent in AgentType::ALL {
            let schema = &registry.spec(agent).unwrap().output_schema;
            for required in ["analysis", "recommendation", "confidence", "sources_used"] {
                assert!(
                    schema.fields.iter().any(|f| f.name == required),
                    "{agent} schema missing {required}"
                );
            }
        }
    }

    #[test]
    fn agent_type_order_is_stable() {
        let mut shuffled = vec![
            AgentType::RiskAssessment,
            AgentType::MarketAnalyst,
            AgentType::EconomicAnalysis,
            AgentType::TechnicalAnalysis,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::EconomicAnalysis,
                AgentType::RiskAssessment,
            ]
        );
    }
}
