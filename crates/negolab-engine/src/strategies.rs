//! Reference agents, so a tournament can run without external strategy
//! code.

use negolab_domain::{ParetoCache, Preference};
use negolab_models::{Action, Bid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::agent::{Agent, AgentContext, AgentEntry};
use crate::error::AgentError;

pub const BOULWARE: &str = "boulware";
pub const CONCEDER: &str = "conceder";
pub const LINEAR: &str = "linear";
pub const HARDLINER: &str = "hardliner";

/// Names accepted by [`builtin_agent`].
pub const BUILTIN_AGENTS: [&str; 4] = [BOULWARE, CONCEDER, LINEAR, HARDLINER];

/// Calls between full recomputes of the estimated frontier.
const PARETO_REFRESH: usize = 10;
/// Width of the utility band above the target that offers are drawn from.
const OFFER_BAND: f64 = 0.05;

/// Look up a reference agent. With a seed every instance draws the same
/// random sequence.
pub fn builtin_agent(name: &str, seed: Option<u64>) -> Option<AgentEntry> {
    let exponent = match name {
        BOULWARE => 0.2,
        CONCEDER => 2.0,
        LINEAR => 1.0,
        HARDLINER => return Some(AgentEntry::new(HARDLINER, || Box::new(Hardliner))),
        _ => return None,
    };
    let label = name.to_string();
    Some(AgentEntry::new(name, move || {
        Box::new(TimeConcession::new(&label, exponent, seed))
    }))
}

/// Time-dependent concession: the target utility falls from the best bid
/// to the reservation value as `1 - t^(1/e)`.
///
/// `e < 1` holds out until late (Boulware), `e > 1` concedes early. When
/// opponent models are attached the agent offers, among the bids on the
/// estimated Pareto frontier that meet its target, the one the first model
/// rates best for the opponent. Accepts an offer that is at least as good as
/// its own next offer.
pub struct TimeConcession {
    name: String,
    exponent: f64,
    rng: StdRng,
    pareto: Option<ParetoCache>,
}

impl TimeConcession {
    pub fn new(name: &str, exponent: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            name: name.to_string(),
            exponent: exponent.max(f64::EPSILON),
            rng,
            pareto: None,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Utility the agent aims for at time `t`.
    pub fn target(&self, preference: &Preference, t: f64) -> f64 {
        let best = preference.utility(&preference.max_util_bid());
        let floor = preference.reservation_value().min(best);
        let conceded = t.clamp(0.0, 1.0).powf(1.0 / self.exponent);
        floor + (best - floor) * (1.0 - conceded)
    }

    fn next_bid(&mut self, ctx: &AgentContext, target: f64) -> Bid {
        let preference = ctx.preference();

        if let (Some(cache), Some(model)) = (self.pareto.as_mut(), ctx.opponent_models().first()) {
            let best_for_opponent = cache
                .frontier(model.preference())
                .iter()
                .filter(|point| point.utility_a() >= target)
                .max_by(|x, y| x.utility_b().total_cmp(&y.utility_b()))
                .and_then(|point| point.bid().cloned());
            if let Some(bid) = best_for_opponent {
                return bid;
            }
        }

        if let Some(bid) = preference.bids_at(target, 0.0, OFFER_BAND).choose(&mut self.rng) {
            return bid.clone();
        }
        // Nothing in the band: the cheapest bid that still meets the target.
        preference
            .bids_in_range(target, 1.0)
            .pop()
            .unwrap_or_else(|| preference.max_util_bid())
    }
}

impl Agent for TimeConcession {
    fn name(&self) -> &str {
        &self.name
    }

    fn initiate(&mut self, ctx: &AgentContext, _opponent_name: Option<&str>) -> Result<(), AgentError> {
        if !ctx.opponent_models().is_empty() {
            let preference = ctx.preference().clone();
            let floor = preference.reservation_value();
            self.pareto = Some(ParetoCache::new(preference, floor, PARETO_REFRESH));
        }
        Ok(())
    }

    fn act(&mut self, ctx: &AgentContext, t: f64) -> Result<Action, AgentError> {
        let preference = ctx.preference().clone();
        let target = self.target(&preference, t);
        let next = self.next_bid(ctx, target);

        if let Some(received) = ctx.last_received_bid() {
            let offered = received
                .utility()
                .unwrap_or_else(|| preference.utility(received));
            if offered >= preference.utility(&next) {
                return Ok(Action::Accept);
            }
        }
        Ok(Action::Offer(next))
    }
}

/// Offers its best bid every turn and accepts nothing less.
#[derive(Debug, Default)]
pub struct Hardliner;

impl Agent for Hardliner {
    fn name(&self) -> &str {
        HARDLINER
    }

    fn act(&mut self, ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        let preference = ctx.preference();
        let best = preference.max_util_bid();

        match ctx.last_received_bid() {
            Some(received) if preference.utility(received) >= preference.utility(&best) => {
                Ok(Action::Accept)
            }
            _ => Ok(Action::Offer(best)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Participant;
    use crate::opponent_model::OpponentModelEntry;
    use crate::test_support::fixture_domain;
    use negolab_models::Side;

    fn seller(name: &str, models: &[OpponentModelEntry]) -> Participant {
        let domain = fixture_domain();
        let ctx = AgentContext::new(Side::A, domain.profile_a().clone());
        let entry = builtin_agent(name, Some(7)).unwrap();
        Participant::new(name, entry.instantiate(), ctx).with_models(models)
    }

    fn offered_utility(participant: &mut Participant, t: f64) -> f64 {
        match participant.act(t).unwrap() {
            Action::Offer(bid) => participant.context().preference().utility(&bid),
            Action::Accept => panic!("expected an offer"),
        }
    }

    #[test]
    fn curves_start_at_best_and_end_at_reservation() {
        let domain = fixture_domain();
        let profile = domain.profile_a();
        for (name, exponent) in [(BOULWARE, 0.2), (CONCEDER, 2.0), (LINEAR, 1.0)] {
            let agent = TimeConcession::new(name, exponent, Some(1));
            assert!((agent.target(profile, 0.0) - 1.0).abs() < 1e-12);
            assert!((agent.target(profile, 1.0) - profile.reservation_value()).abs() < 1e-12);
        }

        let boulware = TimeConcession::new(BOULWARE, 0.2, None);
        let conceder = TimeConcession::new(CONCEDER, 2.0, None);
        assert!(boulware.target(profile, 0.5) > conceder.target(profile, 0.5));
    }

    #[test]
    fn offers_meet_the_target() {
        let mut participant = seller(LINEAR, &[]);
        participant.initiate(None).unwrap();

        let agent = TimeConcession::new(LINEAR, 1.0, None);
        let profile = participant.context().preference().clone();
        for t in [0.0, 0.3, 0.6, 0.9] {
            let utility = offered_utility(&mut participant, t);
            assert!(utility + 1e-12 >= agent.target(&profile, t));
        }
    }

    #[test]
    fn uses_estimated_frontier_when_models_attached() {
        let mut participant = seller(CONCEDER, &[OpponentModelEntry::classic_frequency()]);
        participant.initiate(None).unwrap();
        let low = Bid::from_pairs([("price", "low"), ("delivery", "fast")]);
        participant.receive_bid(&low, 0.1).unwrap();

        let agent = TimeConcession::new(CONCEDER, 2.0, None);
        let profile = participant.context().preference().clone();
        let utility = offered_utility(&mut participant, 0.5);
        assert!(utility + 1e-12 >= agent.target(&profile, 0.5));
    }

    #[test]
    fn accepts_offer_at_least_as_good_as_next() {
        let mut participant = seller(BOULWARE, &[]);
        participant.initiate(None).unwrap();
        let best = Bid::from_pairs([("price", "high"), ("delivery", "slow")]);
        participant.receive_bid(&best, 0.2).unwrap();

        assert_eq!(participant.act(0.2).unwrap(), Action::Accept);
    }

    #[test]
    fn hardliner_never_concedes() {
        let mut participant = seller(HARDLINER, &[]);
        let fair = Bid::from_pairs([("price", "mid"), ("delivery", "normal")]);
        participant.receive_bid(&fair, 0.99).unwrap();

        assert!((offered_utility(&mut participant, 0.99) - 1.0).abs() < 1e-12);
        assert!(builtin_agent("nope", None).is_none());
    }
}
