#[cfg(test)]
use crate::{
    config::{SimConfig, Speed},
    driver,
    report::{FatReport, StateReport},
    simulation::{Admission, Simulation, TickEvent},
    snapshot::PersistedState,
    EngineError,
};
#[cfg(test)]
use osim_common::{FileId, ProcessId, ProcessState, ScriptedRandom, SeededRandom};
#[cfg(test)]
use osim_store::StoreError;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tempfile::NamedTempFile;

#[cfg(test)]
fn scripted(config: SimConfig, rng: ScriptedRandom) -> Simulation<ScriptedRandom> {
    Simulation::with_random(config, rng)
}

#[cfg(test)]
fn ids(raw: &[u32]) -> Vec<ProcessId> {
    raw.iter().copied().map(ProcessId).collect()
}

#[test]
fn test_admission_fits_eight_pages() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());

    let (id, admission) = sim.add_process_with(8, 10).unwrap();

    assert_eq!(id, ProcessId(1));
    assert_eq!(admission, Admission::Ready);
    let stats = sim.stats();
    assert_eq!(stats.memory.occupied, 8);
    assert_eq!(stats.memory.free, 24);
    assert_eq!(stats.processes_active, 1);
}

#[test]
fn test_fifth_large_process_waits() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());

    let admissions: Vec<Admission> = (0..5)
        .map(|_| sim.add_process_with(8, 10).unwrap().1)
        .collect();

    assert_eq!(&admissions[..4], &[Admission::Ready; 4]);
    assert_eq!(admissions[4], Admission::Waiting);
    assert_eq!(sim.stats().memory.occupied, 32);
    assert_eq!(sim.waiting_order(), ids(&[5]));
    assert_eq!(sim.ready_order(), ids(&[1, 2, 3, 4]));
    assert!(sim.check_invariants().is_ok());
}

#[test]
fn test_oversized_demand_is_refused_and_waiting_list_drains() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());
    for _ in 0..4 {
        sim.add_process_with(8, 1).unwrap();
    }

    let err = sim.add_process_with(40, 5).unwrap_err();
    assert!(matches!(
        err,
        EngineError::DemandTooLarge {
            pages: 40,
            frames: 32
        }
    ));

    // The refused demand did not take an id
    let (id, admission) = sim.add_process_with(1, 5).unwrap();
    assert_eq!(id, ProcessId(5));
    assert_eq!(admission, Admission::Waiting);

    sim.start();
    for _ in 0..200 {
        sim.tick();
        if sim.waiting_order().is_empty() {
            break;
        }
    }
    assert!(sim.waiting_order().is_empty());
    assert!(sim.check_invariants().is_ok());
}

#[test]
fn test_zero_demand_is_refused() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());
    assert!(matches!(
        sim.add_process_with(0, 5),
        Err(EngineError::InvalidDemand(_))
    ));
    assert!(matches!(
        sim.add_process_with(2, 0),
        Err(EngineError::InvalidDemand(_))
    ));
    assert_eq!(sim.stats().processes_active, 0);
    assert_eq!(sim.add_process_with(2, 3).unwrap().0, ProcessId(1));
}

#[test]
fn test_one_tick_process_leaves_a_file() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new().with_values([3]));
    sim.add_process_with(2, 1).unwrap();
    sim.start();

    // first tick on the CPU costs nothing
    let first = sim.tick().unwrap();
    assert_eq!(first.events, vec![TickEvent::Dispatched(ProcessId(1))]);
    assert_eq!(sim.executing().map(|p| p.time_remaining), Some(1));

    let second = sim.tick().unwrap();
    assert_eq!(
        second.events,
        vec![
            TickEvent::Executed {
                id: ProcessId(1),
                remaining: 0
            },
            TickEvent::Terminated {
                id: ProcessId(1),
                frames_released: 2
            },
            TickEvent::FileCreated {
                file: FileId(1),
                owner: ProcessId(1),
                clusters: 3
            },
        ]
    );

    assert_eq!(sim.processes().count(), 0);
    assert!(sim.executing().is_none());
    assert_eq!(sim.stats().memory.occupied, 0);

    let file = &sim.files()[0];
    assert_eq!(file.name, "file_1.txt");
    assert_eq!(file.clusters, vec![1, 2, 3]);
    assert_eq!(sim.stats().fat.occupied, 3);
    assert!(sim.check_invariants().is_ok());
}

#[test]
fn test_full_fat_skips_file_but_reclaims_memory() {
    let config = SimConfig {
        total_clusters: 1, // header only
        ..SimConfig::default()
    };
    let mut sim = scripted(config, ScriptedRandom::new());
    sim.add_process_with(4, 1).unwrap();
    sim.start();

    sim.tick();
    let report = sim.tick().unwrap();

    let warnings: Vec<_> = report.warnings().collect();
    assert_eq!(
        warnings,
        vec![&TickEvent::FileSkipped {
            owner: ProcessId(1),
            reason: StoreError::StorageExhausted { needed: 1, free: 0 }
        }]
    );
    assert_eq!(report.terminated(), Some(ProcessId(1)));
    assert_eq!(sim.stats().memory.occupied, 0);
    assert_eq!(sim.processes().count(), 0);
    assert!(sim.files().is_empty());

    // a full FAT also blocks the idle-start admission
    let idle = sim.tick().unwrap();
    assert!(idle.events.is_empty());
    assert!(sim.check_invariants().is_ok());
}

#[test]
fn test_startup_admission_when_idle() {
    let rng = ScriptedRandom::new().with_values([2, 7, 1]);
    let mut sim = scripted(SimConfig::default(), rng);
    sim.start();

    let report = sim.tick().unwrap();
    assert_eq!(
        report.events,
        vec![
            TickEvent::Admitted {
                id: ProcessId(1),
                pages: 2
            },
            TickEvent::Dispatched(ProcessId(1)),
        ]
    );
    assert_eq!(sim.executing().map(|p| p.time_remaining), Some(7));
}

#[test]
fn test_run_to_completion_then_next_head() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());
    sim.add_process_with(1, 3).unwrap();
    sim.add_process_with(1, 2).unwrap();
    sim.start();

    // P1: dispatch + three decrements
    for _ in 0..4 {
        sim.tick();
        if let Some(p) = sim.executing() {
            assert_eq!(p.id, ProcessId(1));
            assert_eq!(sim.processes().nth(1).map(|p| p.state), Some(ProcessState::Ready));
        }
    }
    assert_eq!(sim.ready_order(), ids(&[2]));
    assert_eq!(sim.files().len(), 1);

    let report = sim.tick().unwrap();
    assert_eq!(report.events, vec![TickEvent::Dispatched(ProcessId(2))]);
}

#[test]
fn test_termination_promotes_oldest_waiting_only() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());
    sim.add_process_with(8, 2).unwrap();
    for _ in 0..3 {
        sim.add_process_with(8, 10).unwrap();
    }
    sim.add_process_with(4, 10).unwrap(); // P5 waits
    sim.add_process_with(4, 10).unwrap(); // P6 waits
    assert_eq!(sim.waiting_order(), ids(&[5, 6]));
    sim.start();

    sim.tick();
    sim.tick();
    let report = sim.tick().unwrap();

    // eight frames came back; both would fit, but only one moves per tick
    assert!(report.events.contains(&TickEvent::Promoted(ProcessId(5))));
    assert_eq!(sim.ready_order(), ids(&[2, 3, 4, 5]));
    assert_eq!(sim.waiting_order(), ids(&[6]));
    assert_eq!(sim.stats().memory.free, 4);
    assert!(sim.check_invariants().is_ok());
}

#[test]
fn test_stop_is_lossless_and_resume_redispatches() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new());
    sim.add_process_with(3, 5).unwrap();
    sim.add_process_with(2, 5).unwrap();
    sim.start();
    sim.tick();
    sim.tick();

    let frames = sim.frames().to_vec();
    let clusters = sim.clusters().to_vec();
    let order = sim.ready_order();

    sim.stop();
    assert!(!sim.is_running());
    assert!(sim.executing().is_none());
    let head = sim.processes().next().unwrap();
    assert_eq!(head.state, ProcessState::Ready);
    assert_eq!(head.time_remaining, 4);
    assert_eq!(sim.frames(), &frames[..]);
    assert_eq!(sim.clusters(), &clusters[..]);
    assert_eq!(sim.ready_order(), order);

    // no ticking while stopped
    assert!(sim.tick().is_none());
    assert_eq!(sim.tick_count(), 2);

    sim.start();
    let report = sim.tick().unwrap();
    assert_eq!(report.events, vec![TickEvent::Dispatched(ProcessId(1))]);
    assert_eq!(sim.executing().map(|p| p.time_remaining), Some(4));
    sim.tick();
    assert_eq!(sim.executing().map(|p| p.time_remaining), Some(3));
}

#[test]
fn test_random_arrivals_respect_cap() {
    let config = SimConfig {
        max_live_processes: 2,
        ..SimConfig::default()
    };
    let rng = ScriptedRandom::new()
        .with_coins([true, true, true])
        .with_values([1, 9, 1, 1, 9, 1]);
    let mut sim = scripted(config, rng);
    sim.add_process_with(1, 10).unwrap();
    sim.start();

    let t1 = sim.tick().unwrap();
    assert!(t1.events.contains(&TickEvent::Admitted {
        id: ProcessId(2),
        pages: 1
    }));

    // at the cap: the coin is spent but nobody arrives
    let t2 = sim.tick().unwrap();
    assert!(!t2
        .events
        .iter()
        .any(|e| matches!(e, TickEvent::Admitted { .. })));
    assert_eq!(sim.processes().count(), 2);
}

#[test]
fn test_arrival_without_memory_waits() {
    let rng = ScriptedRandom::new().with_coins([true]).with_values([8, 9, 1]);
    let mut sim = scripted(SimConfig::default(), rng);
    for _ in 0..4 {
        sim.add_process_with(8, 10).unwrap();
    }
    sim.start();

    let report = sim.tick().unwrap();
    assert!(report.events.contains(&TickEvent::Queued {
        id: ProcessId(5),
        pages: 8
    }));
    assert_eq!(sim.stats().processes_waiting, 1);
}

#[test]
fn test_delete_file_frees_clusters_once() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new().with_values([4]));
    sim.add_process_with(1, 1).unwrap();
    sim.start();
    sim.tick();
    sim.tick();
    assert_eq!(sim.stats().fat.occupied, 4);

    let file = sim.delete_file(FileId(1)).unwrap();
    assert_eq!(file.size, 4);
    assert_eq!(sim.stats().fat.occupied, 0);
    assert!(sim.files().is_empty());

    let table = sim.clusters().to_vec();
    let err = sim.delete_file(FileId(1)).unwrap_err();
    assert!(matches!(err, EngineError::FileNotFound(FileId(1))));
    assert_eq!(sim.clusters(), &table[..]);
}

#[test]
fn test_reset_restarts_everything() {
    let mut sim = Simulation::with_random(SimConfig::default(), SeededRandom::seeded(3));
    sim.start();
    for _ in 0..40 {
        sim.tick();
    }
    sim.set_speed(Speed::Fast);
    sim.reset();

    let stats = sim.stats();
    assert!(!sim.is_running());
    assert_eq!(stats.memory.occupied, 0);
    assert_eq!(stats.fat.occupied, 0);
    assert_eq!(stats.processes_active + stats.processes_waiting, 0);
    assert_eq!(stats.files, 0);
    assert_eq!(stats.ticks, 0);
    assert_eq!(sim.speed(), Speed::Fast);

    assert_eq!(sim.add_process().0, ProcessId(1));
}

#[test]
fn test_speed_commands() {
    let mut sim = Simulation::new(SimConfig::default());
    assert_eq!(sim.speed(), Speed::Normal);

    assert_eq!(sim.set_speed_millis(100).unwrap(), Speed::Max);
    assert!(sim.set_speed_millis(123).is_err());
    assert_eq!(sim.speed(), Speed::Max);

    assert!(sim.toggle());
    assert!(!sim.toggle());
}

#[test]
fn test_invariants_hold_over_long_runs() {
    let tight = SimConfig {
        total_frames: 16,
        total_clusters: 24,
        ..SimConfig::default()
    };

    for (seed, config) in [(1, SimConfig::default()), (2, tight.clone()), (3, tight)] {
        let mut sim = Simulation::with_random(config, SeededRandom::seeded(seed));
        sim.start();

        let mut enqueued = Vec::new();
        let mut finished = Vec::new();
        let mut current: Option<ProcessId> = None;

        for _ in 0..3000 {
            let report = sim.tick().unwrap();
            for event in &report.events {
                match event {
                    TickEvent::Admitted { id, .. } | TickEvent::Promoted(id) => enqueued.push(*id),
                    TickEvent::Dispatched(id) => {
                        assert_eq!(current, None, "{id} preempted {current:?}");
                        current = Some(*id);
                    }
                    TickEvent::Executed { id, .. } => assert_eq!(current, Some(*id)),
                    TickEvent::Terminated { id, .. } => {
                        assert_eq!(current, Some(*id));
                        current = None;
                        finished.push(*id);
                    }
                    _ => {}
                }
            }

            if let Err(violation) = sim.check_invariants() {
                panic!("seed {seed}, tick {}: {violation}", report.tick);
            }
            // occasionally make room so the FAT never stays full for good
            if report.tick % 97 == 0 {
                if let Some(id) = sim.files().first().map(|f| f.id) {
                    sim.delete_file(id).unwrap();
                }
            }
        }

        // FIFO: processes finish in the order they entered the queue
        assert!(!finished.is_empty());
        assert_eq!(&enqueued[..finished.len()], &finished[..]);
    }
}

#[test]
fn test_snapshot_restore_round_trip() {
    let mut sim = Simulation::with_random(SimConfig::default(), SeededRandom::seeded(11));
    sim.start();
    for _ in 0..60 {
        sim.tick();
    }
    let state = sim.snapshot();

    let bytes = state.to_bytes().unwrap();
    let decoded = PersistedState::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, state);

    let mut copy = Simulation::with_random(SimConfig::default(), SeededRandom::seeded(99));
    copy.restore(decoded);

    assert_eq!(copy.ready_order(), sim.ready_order());
    assert_eq!(copy.waiting_order(), sim.waiting_order());
    assert_eq!(copy.frames(), sim.frames());
    assert_eq!(copy.clusters(), sim.clusters());
    assert_eq!(copy.files(), sim.files());
    assert!(copy.check_invariants().is_ok());

    // fresh ids never collide with restored ones
    let highest = sim
        .processes()
        .chain(sim.waiting())
        .map(|p| p.id)
        .chain(sim.files().iter().map(|f| f.owner))
        .max()
        .unwrap();
    let (id, _) = copy.add_process();
    assert!(id > highest);
}

#[test]
fn test_snapshot_file_save_load() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new().with_values([2]));
    sim.add_process_with(3, 1).unwrap();
    sim.add_process_with(5, 9).unwrap();
    sim.start();
    sim.tick();
    sim.tick();

    let temp = NamedTempFile::new().unwrap();
    sim.snapshot().save(temp.path()).unwrap();
    let loaded = PersistedState::load(temp.path()).unwrap();

    assert_eq!(loaded, sim.snapshot());
    assert_eq!(loaded.ready.len(), 1);
    assert_eq!(loaded.files.len(), 1);
    assert_eq!(loaded.memory.iter().filter(|f| f.owner.is_some()).count(), 5);
}

#[test]
fn test_load_rejects_garbage() {
    let temp = NamedTempFile::new().unwrap();
    std::fs::write(temp.path(), [0xFF; 3]).unwrap();

    let err = PersistedState::load(temp.path()).unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)));

    let missing = PersistedState::load("/definitely/not/here.snap").unwrap_err();
    assert!(matches!(missing, EngineError::Io(_)));
}

#[test]
fn test_reports() {
    let mut sim = scripted(SimConfig::default(), ScriptedRandom::new().with_values([3]));
    sim.add_process_with(2, 1).unwrap();
    sim.add_process_with(1, 6).unwrap();
    sim.start();
    sim.tick();
    sim.tick();

    let fat = FatReport::build(&sim);
    assert_eq!(fat.clusters.len(), 128);
    assert_eq!(fat.clusters[0].status, "HEADER");
    assert_eq!(fat.clusters[1].status, "NEXT:2");
    assert_eq!(fat.clusters[3].status, "EOF");
    assert_eq!(fat.clusters[4].status, "FREE");
    assert_eq!(fat.clusters[1].owner.as_deref(), Some("P1"));
    assert_eq!(fat.clusters[1].next, Some(2));
    assert_eq!(fat.clusters[2].next, Some(3));
    assert_eq!(fat.clusters[3].next, None);
    assert_eq!(fat.clusters[4].next, None);
    assert_eq!(fat.stats.total, 127);
    assert_eq!(fat.stats.occupied, 3);
    let fat_json = fat.to_json().unwrap();
    assert!(fat_json.contains("\"NEXT:2\""));
    assert!(fat_json.contains("\"next\": 2"));

    let state = StateReport::build(&sim);
    assert_eq!(state.processes.len(), 1);
    assert_eq!(state.processes[0].id, "P2");
    assert_eq!(state.processes[0].state, "ready");
    assert_eq!(state.stats.files, 1);

    let json = state.to_json().unwrap();
    assert!(json.contains("\"processes_active\": 1"));
    assert!(json.contains("\"time_remaining\": 6"));
}

#[tokio::test(start_paused = true)]
async fn test_driver_ticks_while_running() {
    let config = SimConfig {
        speed: Speed::Max,
        seed: Some(5),
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(config);
    sim.start();

    let handle = driver::spawn(sim);
    let mut reports = handle.subscribe();

    for expected in 1..=5 {
        let report = reports.recv().await.unwrap();
        assert_eq!(report.tick, expected);
    }

    {
        let sim = handle.lock().await;
        assert!(sim.tick_count() >= 5);
        assert!(sim.check_invariants().is_ok());
    }

    handle.lock().await.stop();
    while reports.try_recv().is_ok() {}
    let quiet = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await;
    assert!(quiet.is_err(), "stopped driver kept ticking");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_driver_follows_speed_changes() {
    let mut sim = Simulation::new(SimConfig {
        seed: Some(8),
        ..SimConfig::default()
    });
    sim.set_speed(Speed::VerySlow);
    sim.start();

    let handle = driver::spawn(sim);
    let mut reports = handle.subscribe();

    let started = tokio::time::Instant::now();
    reports.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(2000));

    handle.lock().await.set_speed(Speed::Max);
    reports.recv().await.unwrap();
    let fast = tokio::time::Instant::now();
    reports.recv().await.unwrap();
    assert!(fast.elapsed() < Duration::from_millis(200));

    handle.shutdown().await;
}
