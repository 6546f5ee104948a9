//! Clock-wide master selection: the state decision algorithm.
//!
//! Runs over the Erbests of all ports of a clock and produces one
//! [`Recommendation`] per port plus the new clock-wide datasets. The
//! function is pure; the ordinary/boundary clock wrappers own triggering,
//! recommendation delivery, and dataset replacement.
//!
//! Decision points follow IEEE 1588-2019 figure 26: `M1` for a
//! grandmaster-capable clock, `M2` when the local clock beats every foreign
//! master, `M3` for master ports of a clock that is a slave elsewhere, `S1`
//! for the port receiving the best master, and passive for ports that lost
//! against the best master by topology only.

use crate::bmca::{
    compare, BmcaMasterDecision, BmcaMasterDecisionPoint, DatasetOrdering, ErbestSnapshot,
    ForeignClockDS, MasterCandidate,
};
use crate::clock::{DefaultDS, ParentDS, StepsRemoved, TimePropertiesDS};
use crate::port::{ParentPortIdentity, PortIdentity, PortNumber};

/// One port's input to selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortErbest {
    pub port: PortNumber,
    pub receiver: PortIdentity,
    pub erbest: ErbestSnapshot,
}

/// The recommended state of one port after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Master(BmcaMasterDecision),
    Slave(ParentPortIdentity),
    Passive,
}

/// The clock-wide datasets resulting from selection, replaced atomically by
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub parent_ds: ParentDS,
    pub time_properties_ds: TimePropertiesDS,
    pub steps_removed: StepsRemoved,
}

impl Selection {
    fn local(default_ds: &DefaultDS, time_properties: TimePropertiesDS) -> Self {
        Self {
            parent_ds: ParentDS::local(default_ds),
            time_properties_ds: time_properties,
            steps_removed: StepsRemoved::new(0),
        }
    }
}

struct Ebest {
    ds: ForeignClockDS,
    time_properties: TimePropertiesDS,
    source_port_identity: PortIdentity,
    received_on_port: PortNumber,
    receiver: PortIdentity,
}

impl Ebest {
    fn candidate(&self) -> MasterCandidate {
        MasterCandidate::new(self.ds, self.source_port_identity, self.receiver)
    }
}

fn ebest(ports: &[PortErbest]) -> Option<Ebest> {
    let mut best: Option<Ebest> = None;
    for port in ports {
        let ErbestSnapshot::Qualified {
            ds,
            time_properties,
            source_port_identity,
            received_on_port,
        } = port.erbest
        else {
            continue;
        };
        let contender = Ebest {
            ds,
            time_properties,
            source_port_identity,
            received_on_port,
            receiver: port.receiver,
        };
        best = match best {
            None => Some(contender),
            Some(current) => match compare(&current.candidate(), &contender.candidate()) {
                DatasetOrdering::BBetter | DatasetOrdering::BBetterByTopology => Some(contender),
                _ => Some(current),
            },
        };
    }
    best
}

/// Run the state decision algorithm.
///
/// `recommend` is called once for each port that gets a recommendation;
/// slave-only clocks get no master recommendations, so their ports may be
/// skipped entirely.
pub fn select(
    default_ds: &DefaultDS,
    local_time_properties: TimePropertiesDS,
    ports: &[PortErbest],
    mut recommend: impl FnMut(PortNumber, Recommendation),
) -> Selection {
    let d0 = ForeignClockDS::from_default_ds(default_ds);
    let local_master = |point: BmcaMasterDecisionPoint| {
        Recommendation::Master(BmcaMasterDecision {
            point,
            steps_removed: StepsRemoved::new(0),
            grandmaster: d0,
            time_properties: local_time_properties,
        })
    };

    // M1: a grandmaster-capable clock masters every port regardless of what
    // it hears.
    if default_ds.clock_quality.clock_class < 128 {
        for port in ports {
            recommend(port.port, local_master(BmcaMasterDecisionPoint::M1));
        }
        return Selection::local(default_ds, local_time_properties);
    }

    let best = match ebest(ports) {
        Some(best) => best,
        None => {
            if !default_ds.slave_only {
                for port in ports {
                    recommend(port.port, local_master(BmcaMasterDecisionPoint::M2));
                }
            }
            return Selection::local(default_ds, local_time_properties);
        }
    };

    // D0 against Ebest. The local clock has no topology relative to itself,
    // so any win counts.
    let receiver = PortIdentity::new(default_ds.clock_identity, PortNumber::new(0));
    let d0_candidate = MasterCandidate::new(d0, receiver, receiver);
    if !default_ds.slave_only {
        match compare(&d0_candidate, &best.candidate()) {
            DatasetOrdering::ABetter | DatasetOrdering::ABetterByTopology => {
                for port in ports {
                    recommend(port.port, local_master(BmcaMasterDecisionPoint::M2));
                }
                return Selection::local(default_ds, local_time_properties);
            }
            _ => {}
        }
    }

    // S1: the clock synchronizes through the port that received Ebest.
    let steps_removed = best.ds.steps_removed.increment();
    let selection = Selection {
        parent_ds: ParentDS {
            parent_port_identity: best.source_port_identity,
            observed_parent_offset_scaled_log_variance: crate::clock::OBSERVED_VARIANCE_NOT_COMPUTED,
            observed_parent_clock_phase_change_rate:
                crate::clock::OBSERVED_PHASE_CHANGE_RATE_NOT_COMPUTED,
            grandmaster_identity: best.ds.grandmaster_identity,
            grandmaster_clock_quality: best.ds.grandmaster_clock_quality,
            grandmaster_priority1: best.ds.grandmaster_priority1,
            grandmaster_priority2: best.ds.grandmaster_priority2,
        },
        time_properties_ds: best.time_properties,
        steps_removed,
    };

    // Master ports of this clock announce the selected grandmaster at the
    // clock's own distance from it.
    let announced = ForeignClockDS {
        steps_removed,
        ..best.ds
    };
    let downstream_master = Recommendation::Master(BmcaMasterDecision {
        point: BmcaMasterDecisionPoint::M3,
        steps_removed,
        grandmaster: announced,
        time_properties: best.time_properties,
    });

    for port in ports {
        if port.port == best.received_on_port {
            recommend(
                port.port,
                Recommendation::Slave(ParentPortIdentity::new(best.source_port_identity)),
            );
            continue;
        }

        let recommendation = match port.erbest {
            ErbestSnapshot::Empty => {
                if default_ds.slave_only {
                    continue;
                }
                downstream_master
            }
            ErbestSnapshot::Qualified {
                ds,
                source_port_identity,
                ..
            } => {
                let erbest = MasterCandidate::new(ds, source_port_identity, port.receiver);
                match compare(&best.candidate(), &erbest) {
                    // P2: the port hears the selected grandmaster (or an
                    // equally good one) from elsewhere; mastering it would
                    // close a loop.
                    DatasetOrdering::ABetterByTopology | DatasetOrdering::Error => {
                        Recommendation::Passive
                    }
                    _ => {
                        if default_ds.slave_only {
                            continue;
                        }
                        downstream_master
                    }
                }
            }
        };
        recommend(port.port, recommendation);
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::ClockIdentity;
    use crate::test_support::TestClockCatalog;

    fn port(n: u16, clock: &DefaultDS, erbest: ErbestSnapshot) -> PortErbest {
        PortErbest {
            port: PortNumber::new(n),
            receiver: PortIdentity::new(clock.clock_identity, PortNumber::new(n)),
            erbest,
        }
    }

    fn qualified(ds: ForeignClockDS, source: PortIdentity, on_port: u16) -> ErbestSnapshot {
        ErbestSnapshot::Qualified {
            ds,
            time_properties: TestClockCatalog::high_grade().time_properties(),
            source_port_identity: source,
            received_on_port: PortNumber::new(on_port),
        }
    }

    fn run(
        default_ds: &DefaultDS,
        ports: &[PortErbest],
    ) -> (Selection, Vec<(PortNumber, Recommendation)>) {
        let mut recommendations = Vec::new();
        let selection = select(
            default_ds,
            TimePropertiesDS::local_default(crate::clock::TimeScale::Ptp),
            ports,
            |port, recommendation| recommendations.push((port, recommendation)),
        );
        (selection, recommendations)
    }

    #[test]
    fn grandmaster_capable_clock_masters_every_port() {
        let local = TestClockCatalog::high_grade().default_ds();
        let foreign = qualified(
            TestClockCatalog::mid_grade().foreign_ds(),
            PortIdentity::fake(),
            1,
        );

        let (selection, recommendations) = run(
            &local,
            &[
                port(1, &local, foreign),
                port(2, &local, ErbestSnapshot::Empty),
            ],
        );

        assert_eq!(selection.parent_ds, ParentDS::local(&local));
        assert_eq!(selection.steps_removed, StepsRemoved::new(0));
        assert_eq!(recommendations.len(), 2);
        for (_, recommendation) in recommendations {
            match recommendation {
                Recommendation::Master(decision) => {
                    assert_eq!(decision.point, BmcaMasterDecisionPoint::M1);
                    assert_eq!(decision.grandmaster, ForeignClockDS::from_default_ds(&local));
                }
                other => panic!("expected a master recommendation, got {other:?}"),
            }
        }
    }

    #[test]
    fn clock_without_foreign_masters_becomes_master() {
        let local = TestClockCatalog::low_grade().default_ds();

        let (selection, recommendations) = run(&local, &[port(1, &local, ErbestSnapshot::Empty)]);

        assert_eq!(selection.parent_ds, ParentDS::local(&local));
        match recommendations.as_slice() {
            [(_, Recommendation::Master(decision))] => {
                assert_eq!(decision.point, BmcaMasterDecisionPoint::M2);
            }
            other => panic!("expected one M2 recommendation, got {other:?}"),
        }
    }

    #[test]
    fn local_clock_beating_ebest_masters_every_port() {
        // Mid-grade local against a low-grade foreign master.
        let local = TestClockCatalog::mid_grade().default_ds();
        let foreign = qualified(
            TestClockCatalog::low_grade().foreign_ds(),
            PortIdentity::fake(),
            1,
        );

        let (selection, recommendations) = run(&local, &[port(1, &local, foreign)]);

        assert_eq!(selection.parent_ds, ParentDS::local(&local));
        match recommendations.as_slice() {
            [(_, Recommendation::Master(decision))] => {
                assert_eq!(decision.point, BmcaMasterDecisionPoint::M2);
            }
            other => panic!("expected one M2 recommendation, got {other:?}"),
        }
    }

    #[test]
    fn winning_foreign_master_puts_its_port_into_slave() {
        let local = TestClockCatalog::low_grade().default_ds();
        let source = PortIdentity::fake();
        let winner = TestClockCatalog::high_grade().foreign_ds();

        let (selection, recommendations) =
            run(&local, &[port(1, &local, qualified(winner, source, 1))]);

        assert_eq!(
            recommendations,
            [(
                PortNumber::new(1),
                Recommendation::Slave(ParentPortIdentity::new(source))
            )]
        );
        assert_eq!(selection.parent_ds.parent_port_identity, source);
        assert_eq!(
            selection.parent_ds.grandmaster_identity,
            winner.grandmaster_identity
        );
        // One hop further from the grandmaster than the parent claims.
        assert_eq!(selection.steps_removed, StepsRemoved::new(1));
    }

    #[test]
    fn boundary_clock_masters_downstream_and_passivates_loops() {
        let local = TestClockCatalog::low_grade().default_ds();
        let gm = TestClockCatalog::high_grade().foreign_ds();
        let direct = PortIdentity::new(ClockIdentity::new(&[0x01; 8]), PortNumber::new(1));

        // Port 2 hears the same grandmaster one hop further away; port 3
        // hears nothing.
        let looped = ForeignClockDS {
            steps_removed: gm.steps_removed.increment(),
            ..gm
        };
        let loop_source = PortIdentity::new(ClockIdentity::new(&[0x03; 8]), PortNumber::new(2));

        let (selection, recommendations) = run(
            &local,
            &[
                port(1, &local, qualified(gm, direct, 1)),
                port(2, &local, qualified(looped, loop_source, 2)),
                port(3, &local, ErbestSnapshot::Empty),
            ],
        );

        assert_eq!(selection.steps_removed, StepsRemoved::new(1));
        assert_eq!(recommendations.len(), 3);
        assert_eq!(
            recommendations[0],
            (
                PortNumber::new(1),
                Recommendation::Slave(ParentPortIdentity::new(direct))
            )
        );
        assert_eq!(recommendations[1], (PortNumber::new(2), Recommendation::Passive));
        match recommendations[2] {
            (port, Recommendation::Master(decision)) => {
                assert_eq!(port, PortNumber::new(3));
                assert_eq!(decision.point, BmcaMasterDecisionPoint::M3);
                assert_eq!(decision.steps_removed, StepsRemoved::new(1));
                assert_eq!(decision.grandmaster.steps_removed, StepsRemoved::new(1));
                assert_eq!(
                    decision.grandmaster.grandmaster_identity,
                    gm.grandmaster_identity
                );
            }
            other => panic!("expected an M3 recommendation, got {other:?}"),
        }
    }

    #[test]
    fn selection_is_idempotent() {
        let local = TestClockCatalog::low_grade().default_ds();
        let ports = [
            port(
                1,
                &local,
                qualified(
                    TestClockCatalog::high_grade().foreign_ds(),
                    PortIdentity::fake(),
                    1,
                ),
            ),
            port(2, &local, ErbestSnapshot::Empty),
        ];

        let (first_selection, first) = run(&local, &ports);
        let (second_selection, second) = run(&local, &ports);

        assert_eq!(first_selection, second_selection);
        assert_eq!(first, second);
    }

    #[test]
    fn slave_only_clock_never_masters() {
        let local = TestClockCatalog::low_grade_slave_only().default_ds();

        let (selection, recommendations) = run(&local, &[port(1, &local, ErbestSnapshot::Empty)]);

        assert_eq!(selection.parent_ds, ParentDS::local(&local));
        assert_eq!(recommendations, []);

        let source = PortIdentity::fake();
        let (_, recommendations) = run(
            &local,
            &[
                port(
                    1,
                    &local,
                    qualified(TestClockCatalog::high_grade().foreign_ds(), source, 1),
                ),
                port(2, &local, ErbestSnapshot::Empty),
            ],
        );
        assert_eq!(
            recommendations,
            [(
                PortNumber::new(1),
                Recommendation::Slave(ParentPortIdentity::new(source))
            )]
        );
    }
}
