//! Diplomacy: faction relations, treaties and hostility resolution.
//!
//! Each AI kingdom is bound to a faction. A faction's `relation_value`
//! (0..=100) describes its standing with the player:
//!
//! - `>= 75` ally
//! - `<= 25` enemy
//! - otherwise neutral
//!
//! `Truce` is not derived from the value. It is entered through a
//! successful ceasefire and lasts until the ceasefire treaty expires.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GameError, GameResult};
use crate::game::{Cost, KingdomId, Resources, SimulationState};

/// Identifier of a diplomatic faction.
pub type FactionId = u8;

/// Faction of the player. Relations are always measured against it.
pub const PLAYER_FACTION: FactionId = 0;

/// Identifier of a treaty.
pub type TreatyId = u32;

/// Relation value at or above which a faction is an ally.
pub const ALLY_THRESHOLD: u8 = 75;

/// Relation value at or below which a faction is an enemy.
pub const ENEMY_THRESHOLD: u8 = 25;

/// Income granted to the player each year by a trade agreement.
const TRADE_INCOME: Cost = Cost::new(5, 5, 5);

/// Standing of a faction toward the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Friendly; never hostile to other allies.
    Ally,
    /// Indifferent.
    Neutral,
    /// At war.
    Enemy,
    /// Temporary ceasefire.
    Truce,
}

impl Relation {
    /// Relation implied by a scalar value, ignoring truces.
    #[must_use]
    pub const fn from_value(value: u8) -> Self {
        if value >= ALLY_THRESHOLD {
            Relation::Ally
        } else if value <= ENEMY_THRESHOLD {
            Relation::Enemy
        } else {
            Relation::Neutral
        }
    }
}

/// A diplomatic identity bound to a kingdom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    /// Unique identifier.
    pub id: FactionId,
    /// Display name.
    pub name: String,
    /// Standing with the player, 0..=100.
    pub relation_value: u8,
    /// Whether a ceasefire is in force.
    pub truce: bool,
    /// Whether the faction's kingdom has been conquered.
    pub defeated: bool,
}

impl Faction {
    /// Create a faction with the given starting value.
    #[must_use]
    pub fn new(id: FactionId, name: impl Into<String>, relation_value: u8) -> Self {
        Self {
            id,
            name: name.into(),
            relation_value: relation_value.min(100),
            truce: false,
            defeated: false,
        }
    }

    /// Current relation toward the player.
    #[must_use]
    pub const fn relation(&self) -> Relation {
        if self.truce {
            Relation::Truce
        } else {
            Relation::from_value(self.relation_value)
        }
    }

    fn adjust(&mut self, delta: i32) {
        let value = (i32::from(self.relation_value) + delta).clamp(0, 100);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            self.relation_value = value as u8;
        }
    }
}

/// Kind of agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatyType {
    /// Yearly resource income for the player.
    TradeAgreement,
    /// Military alliance. Allies join wars declared on each other.
    Alliance,
    /// Ceasefire holding a truce in place.
    Ceasefire,
}

/// An agreement between two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treaty {
    /// Unique identifier.
    pub id: TreatyId,
    /// Kind of agreement.
    pub kind: TreatyType,
    /// The two signatories.
    pub parties: [FactionId; 2],
    /// In-game years until expiry.
    pub years_remaining: u32,
    /// Yearly income granted to the player while in force.
    pub yearly_income: Cost,
}

impl Treaty {
    /// Whether `faction` is a signatory.
    #[must_use]
    pub fn involves(&self, faction: FactionId) -> bool {
        self.parties.contains(&faction)
    }

    /// The signatory that is not `faction`.
    #[must_use]
    pub fn other_party(&self, faction: FactionId) -> Option<FactionId> {
        match self.parties {
            [a, b] if a == faction => Some(b),
            [a, b] if b == faction => Some(a),
            _ => None,
        }
    }
}

/// Diplomatic action issued by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiplomacyAction {
    /// Offer a trade agreement.
    ProposeTrade,
    /// Offer a military alliance.
    ProposeAlliance,
    /// Offer a ceasefire to an enemy.
    OfferCeasefire,
    /// Declare war.
    DeclareWar,
    /// Send resources as a gift.
    SendGift,
    /// Ask an ally for troops.
    RequestMilitaryAssistance,
}

/// Structured consequence of a diplomatic action or of treaty decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiplomacyEvent {
    /// A relation value moved.
    RelationChanged {
        /// Faction affected.
        faction: FactionId,
        /// Value before.
        from: u8,
        /// Value after.
        to: u8,
    },
    /// A treaty was signed.
    TreatySigned {
        /// New treaty.
        treaty: TreatyId,
        /// Its kind.
        kind: TreatyType,
    },
    /// A treaty was cancelled or ran out.
    TreatyEnded {
        /// Ended treaty.
        treaty: TreatyId,
        /// Its kind.
        kind: TreatyType,
    },
    /// A third party joined a war through its alliance.
    JoinedWar {
        /// Faction that turned enemy.
        faction: FactionId,
    },
    /// An ally agreed to send soldiers.
    AssistancePledged {
        /// Ally sending soldiers.
        faction: FactionId,
    },
}

/// Result of a diplomatic action, for message display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomacyOutcome {
    /// Action taken.
    pub action: DiplomacyAction,
    /// Faction addressed.
    pub faction: FactionId,
    /// Whether the counterpart accepted.
    pub success: bool,
    /// Relation after the action.
    pub relation: Relation,
    /// Everything that changed.
    pub events: Vec<DiplomacyEvent>,
}

/// Summary of one in-game year of treaty decay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearReport {
    /// Income owed to the player by active treaties.
    pub income: Cost,
    /// Treaties that expired.
    pub events: Vec<DiplomacyEvent>,
}

/// All diplomatic state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diplomacy {
    /// Player reputation, -100..=100.
    pub reputation: i32,
    /// Known factions by id.
    pub factions: BTreeMap<FactionId, Faction>,
    /// Active treaties.
    pub treaties: Vec<Treaty>,
    /// Id for the next treaty.
    pub next_treaty_id: TreatyId,
}

/// Probability that two factions' kingdoms clash, given their relations
/// toward the player. Symmetric in its arguments.
#[must_use]
pub fn pair_hostility(a: Option<Relation>, b: Option<Relation>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.3;
    };
    // A truce counts as neutral between third parties.
    let norm = |r: Relation| if r == Relation::Truce { Relation::Neutral } else { r };
    match (norm(a), norm(b)) {
        (Relation::Ally, Relation::Ally) => 0.0,
        (Relation::Ally, Relation::Enemy) | (Relation::Enemy, Relation::Ally) => 1.0,
        (Relation::Enemy, Relation::Enemy) => 0.7,
        (Relation::Enemy, Relation::Neutral) | (Relation::Neutral, Relation::Enemy) => 0.3,
        _ => 0.1,
    }
}

/// Probability that a faction's kingdom clashes with the player.
#[must_use]
pub fn player_hostility(relation: Option<Relation>) -> f64 {
    match relation {
        Some(Relation::Ally | Relation::Truce) => 0.0,
        Some(Relation::Enemy) => 1.0,
        Some(Relation::Neutral) => 0.1,
        None => 0.3,
    }
}

/// Roll a probability, short-circuiting the certain cases.
pub(crate) fn roll<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    if p <= 0.0 {
        false
    } else if p >= 1.0 {
        true
    } else {
        rng.random_bool(p)
    }
}

/// Probability that units of kingdoms `a` and `b` fight when they meet.
///
/// Looks up both kingdoms' factions and reads [`player_hostility`] when one
/// side is the player. Factions bound by an alliance treaty never clash;
/// other pairs read [`pair_hostility`]. Symmetric.
#[must_use]
pub fn hostility_chance(state: &SimulationState, a: KingdomId, b: KingdomId) -> f64 {
    if a == b {
        return 0.0;
    }
    let faction_of = |k: KingdomId| state.kingdom(k).map(|kingdom| kingdom.faction);
    let relation_of = |f: Option<FactionId>| f.and_then(|f| state.diplomacy.relation(f));
    let (fa, fb) = (faction_of(a), faction_of(b));

    match (fa, fb) {
        (Some(PLAYER_FACTION), other) | (other, Some(PLAYER_FACTION)) => {
            player_hostility(relation_of(other))
        }
        (Some(x), Some(y)) if state.diplomacy.has_treaty(x, y, TreatyType::Alliance) => 0.0,
        _ => pair_hostility(relation_of(fa), relation_of(fb)),
    }
}

/// Whether kingdoms `a` and `b` fight when their units meet.
///
/// Allies never fight each other; other pairings roll against
/// [`hostility_chance`], so repeated calls may disagree.
pub fn are_kingdoms_hostile<R: Rng + ?Sized>(
    state: &SimulationState,
    a: KingdomId,
    b: KingdomId,
    rng: &mut R,
) -> bool {
    roll(rng, hostility_chance(state, a, b))
}

impl Diplomacy {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a faction.
    pub fn add_faction(&mut self, faction: Faction) {
        self.factions.insert(faction.id, faction);
    }

    /// Relation of a faction toward the player.
    #[must_use]
    pub fn relation(&self, faction: FactionId) -> Option<Relation> {
        self.factions.get(&faction).map(Faction::relation)
    }

    /// Whether an active treaty of `kind` binds `a` and `b`.
    #[must_use]
    pub fn has_treaty(&self, a: FactionId, b: FactionId, kind: TreatyType) -> bool {
        self.treaties
            .iter()
            .any(|t| t.kind == kind && t.involves(a) && t.other_party(a) == Some(b))
    }

    /// Sign a new treaty and return the event.
    pub fn sign(&mut self, kind: TreatyType, a: FactionId, b: FactionId, years: u32) -> DiplomacyEvent {
        let id = self.next_treaty_id;
        self.next_treaty_id += 1;
        let yearly_income = if kind == TreatyType::TradeAgreement {
            TRADE_INCOME
        } else {
            Cost::default()
        };
        self.treaties.push(Treaty {
            id,
            kind,
            parties: [a, b],
            years_remaining: years,
            yearly_income,
        });
        DiplomacyEvent::TreatySigned { treaty: id, kind }
    }

    /// Mark a faction's kingdom as conquered and void its treaties.
    pub fn mark_defeated(&mut self, faction: FactionId) {
        if let Some(f) = self.factions.get_mut(&faction) {
            f.defeated = true;
        }
        self.treaties.retain(|t| !t.involves(faction));
    }

    fn live_faction(&self, faction: FactionId) -> GameResult<&Faction> {
        match self.factions.get(&faction) {
            Some(f) if !f.defeated => Ok(f),
            Some(_) => Err(GameError::target(format!("faction {faction} has been defeated"))),
            None => Err(GameError::target(format!("no faction {faction}"))),
        }
    }

    fn change_relation(&mut self, faction: FactionId, delta: i32, events: &mut Vec<DiplomacyEvent>) {
        if let Some(f) = self.factions.get_mut(&faction) {
            let from = f.relation_value;
            f.adjust(delta);
            if from != f.relation_value {
                events.push(DiplomacyEvent::RelationChanged {
                    faction,
                    from,
                    to: f.relation_value,
                });
            }
        }
    }

    fn cancel_treaties(&mut self, faction: FactionId, with: Option<FactionId>, events: &mut Vec<DiplomacyEvent>) {
        self.treaties.retain(|t| {
            let hit = t.involves(faction) && with.is_none_or(|w| t.other_party(faction) == Some(w));
            if hit {
                events.push(DiplomacyEvent::TreatyEnded {
                    treaty: t.id,
                    kind: t.kind,
                });
            }
            !hit
        });
    }

    fn outcome(&self, action: DiplomacyAction, faction: FactionId, success: bool, events: Vec<DiplomacyEvent>) -> DiplomacyOutcome {
        DiplomacyOutcome {
            action,
            faction,
            success,
            relation: self.relation(faction).unwrap_or(Relation::Neutral),
            events,
        }
    }

    fn adjust_reputation(&mut self, delta: i32) {
        self.reputation = (self.reputation + delta).clamp(-100, 100);
    }

    /// Propose a trade agreement.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] for unknown, defeated or enemy factions.
    pub fn propose_trade<R: Rng + ?Sized>(&mut self, faction: FactionId, rng: &mut R) -> GameResult<DiplomacyOutcome> {
        let f = self.live_faction(faction)?;
        if f.relation() == Relation::Enemy {
            return Err(GameError::target(format!("faction {faction} refuses to trade with an enemy")));
        }
        let p = 0.1 + 0.8 * f64::from(f.relation_value) / 100.0;
        let mut events = Vec::new();
        let success = roll(rng, p);
        if success {
            events.push(self.sign(TreatyType::TradeAgreement, PLAYER_FACTION, faction, 5));
            self.change_relation(faction, 5, &mut events);
        } else {
            self.change_relation(faction, -2, &mut events);
        }
        Ok(self.outcome(DiplomacyAction::ProposeTrade, faction, success, events))
    }

    /// Propose a military alliance.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] for unknown or defeated factions, or if
    /// an alliance is already in force.
    pub fn propose_alliance<R: Rng + ?Sized>(&mut self, faction: FactionId, rng: &mut R) -> GameResult<DiplomacyOutcome> {
        let f = self.live_faction(faction)?;
        if self.has_treaty(PLAYER_FACTION, faction, TreatyType::Alliance) {
            return Err(GameError::target(format!("already allied with faction {faction}")));
        }
        let p = ((f64::from(f.relation_value) - 40.0) / 60.0).clamp(0.0, 0.9);
        let mut events = Vec::new();
        let success = roll(rng, p);
        if success {
            events.push(self.sign(TreatyType::Alliance, PLAYER_FACTION, faction, 10));
            let current = self.factions.get(&faction).map_or(0, |f| f.relation_value);
            let lift = i32::from(ALLY_THRESHOLD.saturating_sub(current)).max(15);
            self.change_relation(faction, lift, &mut events);
        } else {
            self.change_relation(faction, -5, &mut events);
        }
        Ok(self.outcome(DiplomacyAction::ProposeAlliance, faction, success, events))
    }

    /// Offer a ceasefire to an enemy faction.
    ///
    /// `player_strength` and `faction_strength` are the two sides' military
    /// weights; a stronger player is more persuasive.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] unless the faction is currently an enemy.
    pub fn offer_ceasefire<R: Rng + ?Sized>(
        &mut self,
        faction: FactionId,
        player_strength: f64,
        faction_strength: f64,
        rng: &mut R,
    ) -> GameResult<DiplomacyOutcome> {
        let f = self.live_faction(faction)?;
        if f.relation() != Relation::Enemy {
            return Err(GameError::target(format!("faction {faction} is not at war")));
        }
        let total = player_strength + faction_strength;
        let ratio = if total > 0.0 { player_strength / total } else { 0.5 };
        let p = 0.2 + f64::from(f.relation_value) / 200.0 + 0.4 * (ratio - 0.5);
        let mut events = Vec::new();
        let success = roll(rng, p);
        if success {
            events.push(self.sign(TreatyType::Ceasefire, PLAYER_FACTION, faction, 3));
            if let Some(f) = self.factions.get_mut(&faction) {
                f.truce = true;
            }
            self.change_relation(faction, 10, &mut events);
        } else {
            self.change_relation(faction, -3, &mut events);
        }
        Ok(self.outcome(DiplomacyAction::OfferCeasefire, faction, success, events))
    }

    /// Declare war on a faction.
    ///
    /// Always succeeds: every treaty of the target is cancelled, the target
    /// becomes an enemy, and its military allies turn on the player too.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] for unknown or defeated factions.
    pub fn declare_war(&mut self, faction: FactionId) -> GameResult<DiplomacyOutcome> {
        self.live_faction(faction)?;
        let mut events = Vec::new();

        let allies: Vec<FactionId> = self
            .treaties
            .iter()
            .filter(|t| t.kind == TreatyType::Alliance)
            .filter_map(|t| t.other_party(faction))
            .filter(|other| *other != PLAYER_FACTION)
            .collect();

        self.cancel_treaties(faction, None, &mut events);
        if let Some(f) = self.factions.get_mut(&faction) {
            f.truce = false;
        }
        self.change_relation(faction, -100, &mut events);
        self.adjust_reputation(-10);

        for ally in allies {
            if self.factions.get(&ally).is_none_or(|f| f.defeated) {
                continue;
            }
            self.cancel_treaties(ally, Some(PLAYER_FACTION), &mut events);
            if let Some(f) = self.factions.get_mut(&ally) {
                f.truce = false;
                let from = f.relation_value;
                f.relation_value = f.relation_value.min(20);
                if from != f.relation_value {
                    events.push(DiplomacyEvent::RelationChanged {
                        faction: ally,
                        from,
                        to: f.relation_value,
                    });
                }
            }
            events.push(DiplomacyEvent::JoinedWar { faction: ally });
        }
        info!(faction, "war declared");
        Ok(self.outcome(DiplomacyAction::DeclareWar, faction, true, events))
    }

    /// Send a gift drawn from `treasury`.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] for unknown or defeated factions, or
    /// [`GameError::InsufficientResources`] if the treasury cannot cover the
    /// gift. Nothing is spent on error.
    pub fn send_gift<R: Rng + ?Sized>(
        &mut self,
        faction: FactionId,
        gift: Cost,
        treasury: &mut Resources,
        rng: &mut R,
    ) -> GameResult<DiplomacyOutcome> {
        self.live_faction(faction)?;
        if gift == Cost::default() {
            return Err(GameError::target("an empty gift"));
        }
        treasury.spend(gift)?;
        let mut events = Vec::new();
        let success = roll(rng, 0.8);
        self.change_relation(faction, if success { 10 } else { 3 }, &mut events);
        self.adjust_reputation(1);
        Ok(self.outcome(DiplomacyAction::SendGift, faction, success, events))
    }

    /// Ask an allied faction for soldiers.
    ///
    /// Only decides acceptance; moving the soldiers is up to the caller.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidTarget`] unless an alliance with the faction is
    /// in force.
    pub fn request_military_assistance<R: Rng + ?Sized>(
        &mut self,
        faction: FactionId,
        rng: &mut R,
    ) -> GameResult<DiplomacyOutcome> {
        let f = self.live_faction(faction)?;
        if !self.has_treaty(PLAYER_FACTION, faction, TreatyType::Alliance) {
            return Err(GameError::target(format!("no alliance with faction {faction}")));
        }
        let p = f64::from(f.relation_value) / 100.0;
        let mut events = Vec::new();
        let success = roll(rng, p);
        if success {
            events.push(DiplomacyEvent::AssistancePledged { faction });
        } else {
            self.change_relation(faction, -2, &mut events);
        }
        Ok(self.outcome(DiplomacyAction::RequestMilitaryAssistance, faction, success, events))
    }

    /// Age every treaty by one in-game year.
    ///
    /// Expired ceasefires end the truce and leave the faction neutral.
    pub fn advance_year(&mut self) -> YearReport {
        let mut report = YearReport::default();
        for treaty in &self.treaties {
            if treaty.involves(PLAYER_FACTION) {
                report.income = Cost::new(
                    report.income.wood + treaty.yearly_income.wood,
                    report.income.stone + treaty.yearly_income.stone,
                    report.income.food + treaty.yearly_income.food,
                );
            }
        }

        let mut ended_truces = Vec::new();
        self.treaties.retain_mut(|t| {
            t.years_remaining = t.years_remaining.saturating_sub(1);
            if t.years_remaining > 0 {
                return true;
            }
            report.events.push(DiplomacyEvent::TreatyEnded {
                treaty: t.id,
                kind: t.kind,
            });
            if t.kind == TreatyType::Ceasefire {
                ended_truces.extend(t.other_party(PLAYER_FACTION));
            }
            false
        });

        for faction in ended_truces {
            if let Some(f) = self.factions.get_mut(&faction) {
                f.truce = false;
                f.relation_value = f
                    .relation_value
                    .clamp(ENEMY_THRESHOLD + 1, ALLY_THRESHOLD - 1);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn diplomacy_with(values: &[(FactionId, u8)]) -> Diplomacy {
        let mut d = Diplomacy::new();
        for &(id, value) in values {
            d.add_faction(Faction::new(id, format!("faction-{id}"), value));
        }
        d
    }

    #[test]
    fn test_relation_thresholds() {
        assert_eq!(Relation::from_value(75), Relation::Ally);
        assert_eq!(Relation::from_value(74), Relation::Neutral);
        assert_eq!(Relation::from_value(26), Relation::Neutral);
        assert_eq!(Relation::from_value(25), Relation::Enemy);
        let mut f = Faction::new(1, "x", 90);
        f.truce = true;
        assert_eq!(f.relation(), Relation::Truce);
    }

    #[test]
    fn test_pair_hostility_table_is_symmetric() {
        let all = [
            None,
            Some(Relation::Ally),
            Some(Relation::Neutral),
            Some(Relation::Enemy),
            Some(Relation::Truce),
        ];
        for a in all {
            for b in all {
                assert!((pair_hostility(a, b) - pair_hostility(b, a)).abs() < f64::EPSILON);
            }
        }
        assert!(pair_hostility(Some(Relation::Ally), Some(Relation::Ally)) < f64::EPSILON);
        assert!((pair_hostility(Some(Relation::Ally), Some(Relation::Enemy)) - 1.0).abs() < f64::EPSILON);
        assert!((pair_hostility(Some(Relation::Enemy), Some(Relation::Enemy)) - 0.7).abs() < f64::EPSILON);
        assert!((pair_hostility(Some(Relation::Neutral), Some(Relation::Neutral)) - 0.1).abs() < f64::EPSILON);
        assert!((pair_hostility(None, Some(Relation::Ally)) - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trade_refused_by_enemy() {
        let mut d = diplomacy_with(&[(1, 10)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(d.propose_trade(1, &mut rng), Err(GameError::InvalidTarget(_))));
        assert!(matches!(d.propose_trade(9, &mut rng), Err(GameError::InvalidTarget(_))));
    }

    #[test]
    fn test_trade_outcome_moves_relation() {
        let mut d = diplomacy_with(&[(1, 50)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let outcome = d.propose_trade(1, &mut rng).unwrap();
        let value = d.factions[&1].relation_value;
        if outcome.success {
            assert_eq!(value, 55);
            assert!(d.has_treaty(PLAYER_FACTION, 1, TreatyType::TradeAgreement));
        } else {
            assert_eq!(value, 48);
            assert!(d.treaties.is_empty());
        }
    }

    #[test]
    fn test_alliance_impossible_at_low_value() {
        let mut d = diplomacy_with(&[(1, 40)]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..5 {
            let outcome = d.propose_alliance(1, &mut rng).unwrap();
            assert!(!outcome.success);
        }
        assert_eq!(d.factions[&1].relation_value, 15);
    }

    #[test]
    fn test_ceasefire_only_for_enemies() {
        let mut d = diplomacy_with(&[(1, 50), (2, 0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        assert!(d.offer_ceasefire(1, 10.0, 10.0, &mut rng).is_err());

        // Overwhelming strength: p = 0.2 + 0 + 0.4 * 0.5 = 0.4; loop until accepted.
        let mut accepted = false;
        for _ in 0..50 {
            if d.relation(2) != Some(Relation::Enemy) {
                break;
            }
            if d.offer_ceasefire(2, 1000.0, 0.0, &mut rng).unwrap().success {
                accepted = true;
                break;
            }
        }
        if accepted {
            assert_eq!(d.relation(2), Some(Relation::Truce));
            assert!(d.has_treaty(PLAYER_FACTION, 2, TreatyType::Ceasefire));
        }
    }

    #[test]
    fn test_declare_war_cascades_to_military_allies() {
        let mut d = diplomacy_with(&[(1, 60), (2, 70), (3, 50)]);
        d.sign(TreatyType::Alliance, 1, 2, 10);
        d.sign(TreatyType::TradeAgreement, PLAYER_FACTION, 1, 5);
        d.sign(TreatyType::TradeAgreement, PLAYER_FACTION, 2, 5);
        d.sign(TreatyType::TradeAgreement, PLAYER_FACTION, 3, 5);

        let outcome = d.declare_war(1).unwrap();
        assert!(outcome.success);
        assert_eq!(d.relation(1), Some(Relation::Enemy));
        assert_eq!(d.relation(2), Some(Relation::Enemy));
        assert_eq!(d.relation(3), Some(Relation::Neutral));
        assert!(outcome.events.contains(&DiplomacyEvent::JoinedWar { faction: 2 }));
        assert!(!d.treaties.iter().any(|t| t.involves(1)));
        assert!(!d.has_treaty(PLAYER_FACTION, 2, TreatyType::TradeAgreement));
        assert!(d.has_treaty(PLAYER_FACTION, 3, TreatyType::TradeAgreement));
        assert_eq!(d.reputation, -10);
    }

    #[test]
    fn test_gift_checks_treasury_first() {
        let mut d = diplomacy_with(&[(1, 50)]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut treasury = Resources::new(5, 5, 5);
        let err = d.send_gift(1, Cost::new(10, 0, 0), &mut treasury, &mut rng);
        assert!(matches!(err, Err(GameError::InsufficientResources { .. })));
        assert_eq!(treasury, Resources::new(5, 5, 5));
        assert_eq!(d.factions[&1].relation_value, 50);

        let outcome = d.send_gift(1, Cost::new(5, 0, 0), &mut treasury, &mut rng).unwrap();
        assert_eq!(treasury.wood, 0);
        let expected = if outcome.success { 60 } else { 53 };
        assert_eq!(d.factions[&1].relation_value, expected);
    }

    #[test]
    fn test_assistance_requires_alliance() {
        let mut d = diplomacy_with(&[(1, 100)]);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(d.request_military_assistance(1, &mut rng).is_err());
        d.sign(TreatyType::Alliance, PLAYER_FACTION, 1, 10);
        let outcome = d.request_military_assistance(1, &mut rng).unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn test_year_decay_expires_ceasefire() {
        let mut d = diplomacy_with(&[(1, 10)]);
        d.sign(TreatyType::Ceasefire, PLAYER_FACTION, 1, 2);
        d.sign(TreatyType::TradeAgreement, PLAYER_FACTION, 1, 5);
        d.factions.get_mut(&1).unwrap().truce = true;

        let first = d.advance_year();
        assert_eq!(first.income, TRADE_INCOME);
        assert_eq!(d.relation(1), Some(Relation::Truce));

        let second = d.advance_year();
        assert_eq!(second.events.len(), 1);
        assert_eq!(d.relation(1), Some(Relation::Neutral));
        assert_eq!(d.factions[&1].relation_value, ENEMY_THRESHOLD + 1);
        assert_eq!(d.treaties.len(), 1);
    }

    #[test]
    fn test_defeated_faction_is_invalid_target() {
        let mut d = diplomacy_with(&[(1, 50)]);
        d.sign(TreatyType::TradeAgreement, PLAYER_FACTION, 1, 5);
        d.mark_defeated(1);
        assert!(d.treaties.is_empty());
        assert!(matches!(d.declare_war(1), Err(GameError::InvalidTarget(_))));
    }
}
