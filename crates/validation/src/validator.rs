use std::collections::HashMap;
use std::sync::Arc;

use backtest_engine::{BackTester, BacktestStrategy};
use market_data::Security;
use parallel_exec::Executor;
use pattern_catalog::PatternCatalog;
use rust_decimal::Decimal;
use tracing::info;
use trading_core::{Result, TradingError};

use crate::mcpt::MonteCarloPermutationTest;
use crate::partition::{PartitionGranularity, StrategyFamilyPartitioner};
use crate::policy::StatisticPolicy;
use crate::preparer::StrategyDataPreparer;
use crate::stepdown::{MastersRomanoWolf, MastersRomanoWolfImproved};
use crate::synthetic_market::SyntheticMarketGenerator;
use crate::types::{StrategyDataContainer, StrategyVerdict, ValidationOutcome};

/// Which step-down engine a validation run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepDownAlgorithm {
    Naive,
    #[default]
    Improved,
}

/// Validator-level configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub num_permutations: u32,
    /// Inclusive significance level: `p <= alpha` survives.
    pub alpha: Decimal,
    pub master_seed: u64,
    pub partition_by_family: bool,
}

impl ValidationConfig {
    pub fn new(num_permutations: u32) -> Result<Self> {
        if num_permutations == 0 {
            return Err(TradingError::InvalidArgument(
                "number of permutations must be positive".to_string(),
            ));
        }
        Ok(Self {
            num_permutations,
            alpha: Decimal::new(5, 2),
            master_seed: 0,
            partition_by_family: false,
        })
    }

    pub fn with_alpha(mut self, alpha: Decimal) -> Result<Self> {
        if alpha <= Decimal::ZERO || alpha > Decimal::ONE {
            return Err(TradingError::InvalidArgument(format!(
                "alpha must be in (0, 1], got {alpha}"
            )));
        }
        self.alpha = alpha;
        Ok(self)
    }

    pub fn with_master_seed(mut self, master_seed: u64) -> Self {
        self.master_seed = master_seed;
        self
    }

    pub fn with_family_partitioning(mut self, enabled: bool) -> Self {
        self.partition_by_family = enabled;
        self
    }
}

/// Top-level validator: prepares baselines for the whole catalog, runs the
/// chosen permutation procedure, and reports surviving strategies.
pub struct MonteCarloValidator {
    config: ValidationConfig,
    policy: Arc<dyn StatisticPolicy>,
}

impl MonteCarloValidator {
    pub fn new(config: ValidationConfig, policy: Arc<dyn StatisticPolicy>) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    fn prepare(
        &self,
        template: &BackTester,
        base_security: &Arc<Security>,
        catalog: &PatternCatalog,
        executor: &dyn Executor,
    ) -> Result<(StrategyDataContainer, Arc<SyntheticMarketGenerator>)> {
        let data = StrategyDataPreparer::prepare(
            template,
            base_security,
            catalog,
            self.policy.clone(),
            executor,
        )?;
        let generator = Arc::new(SyntheticMarketGenerator::new(base_security.clone())?);
        Ok((data, generator))
    }

    fn outcome(
        &self,
        data: &StrategyDataContainer,
        pvalues: &HashMap<usize, Decimal>,
    ) -> ValidationOutcome {
        let mut verdicts: Vec<StrategyVerdict> = data
            .iter()
            .enumerate()
            .map(|(index, context)| {
                let p = pvalues.get(&index).copied().unwrap_or(Decimal::ONE);
                StrategyVerdict {
                    strategy_name: context.strategy.name().to_string(),
                    direction: context.strategy.pattern().direction(),
                    baseline_stat: context.baseline_stat,
                    num_trades: context.num_trades,
                    adjusted_p_value: p,
                    survives: p <= self.config.alpha,
                }
            })
            .collect();
        verdicts.sort_by(|a, b| b.baseline_stat.cmp(&a.baseline_stat));
        ValidationOutcome {
            alpha: self.config.alpha,
            num_permutations: self.config.num_permutations,
            verdicts,
        }
    }

    /// Single-pattern MCPT across the catalog: each strategy is tested
    /// against its own permutation null, with no multiplicity adjustment.
    pub fn validate_unadjusted(
        &self,
        template: &BackTester,
        base_security: &Arc<Security>,
        catalog: &PatternCatalog,
        executor: &dyn Executor,
    ) -> Result<ValidationOutcome> {
        let (data, generator) = self.prepare(template, base_security, catalog, executor)?;
        let test = MonteCarloPermutationTest::new(
            self.config.num_permutations,
            self.config.master_seed,
        )?;

        let mut pvalues = HashMap::with_capacity(data.len());
        for (index, context) in data.iter().enumerate() {
            let result = test.run(template, context, &generator, self.policy.clone(), executor)?;
            pvalues.insert(index, result.p_value);
        }
        Ok(self.outcome(&data, &pvalues))
    }

    /// Family-wise-error-controlled validation via the step-down procedure,
    /// optionally partitioned into classifier families first.
    pub fn validate(
        &self,
        template: &BackTester,
        base_security: &Arc<Security>,
        catalog: &PatternCatalog,
        executor: &dyn Executor,
        algorithm: StepDownAlgorithm,
    ) -> Result<ValidationOutcome> {
        let (data, generator) = self.prepare(template, base_security, catalog, executor)?;

        let pvalues = if self.config.partition_by_family {
            let granularity = PartitionGranularity::auto(data.len());
            let partitioner = StrategyFamilyPartitioner::new(data.clone(), granularity);

            // The partitioner preserves container order within a family, so
            // grouping the global indices by the same keys restores the
            // member -> container mapping.
            let mut index_groups: HashMap<crate::partition::StrategyFamilyKey, Vec<usize>> =
                HashMap::new();
            for (index, context) in data.iter().enumerate() {
                let key = crate::partition::family_key(context.strategy.pattern(), granularity);
                index_groups.entry(key).or_default().push(index);
            }

            let mut merged: HashMap<usize, Decimal> = HashMap::with_capacity(data.len());
            for (key, members) in partitioner.iter() {
                info!(family = %key, members = members.len(), "validating family");
                let family_pvalues =
                    self.run_algorithm(members, template, &generator, executor, algorithm)?;
                let global_indices = &index_groups[key];
                for (member_position, p) in family_pvalues {
                    merged.insert(global_indices[member_position], p);
                }
            }
            merged
        } else {
            self.run_algorithm(&data, template, &generator, executor, algorithm)?
        };

        let outcome = self.outcome(&data, &pvalues);
        info!(
            surviving = outcome.num_surviving(),
            total = outcome.verdicts.len(),
            "validation complete"
        );
        Ok(outcome)
    }

    fn run_algorithm(
        &self,
        data: &StrategyDataContainer,
        template: &BackTester,
        generator: &Arc<SyntheticMarketGenerator>,
        executor: &dyn Executor,
        algorithm: StepDownAlgorithm,
    ) -> Result<HashMap<usize, Decimal>> {
        match algorithm {
            StepDownAlgorithm::Naive => MastersRomanoWolf::new(
                self.config.num_permutations,
                self.config.master_seed,
            )?
            .run(
                data,
                template,
                generator,
                self.policy.clone(),
                executor,
                self.config.alpha,
            ),
            StepDownAlgorithm::Improved => MastersRomanoWolfImproved::new(
                self.config.num_permutations,
                self.config.master_seed,
            )?
            .run(
                data,
                template,
                generator,
                self.policy.clone(),
                executor,
                self.config.alpha,
            ),
        }
    }
}
