#![no_main]

//! Random create/delete/remove sequences; the Blocks subgraph must stay
//! acyclic and every accepted edge must be retrievable.

use libfuzzer_sys::fuzz_target;

use taskdeps_core::graph::{GraphStore, has_cycles};
use taskdeps_core::status::MemoryStatusSource;
use taskdeps_core::store::memory::MemoryEdgeStore;
use taskdeps_core::{DependencyEngine, DependencyError, DependencyType, TaskId, TaskStatus};

const TASKS: u8 = 12;

fn task(i: u8) -> TaskId {
    TaskId::new(format!("t{}", i % TASKS))
}

fuzz_target!(|data: &[u8]| {
    let statuses =
        MemoryStatusSource::with_tasks((0..TASKS).map(|i| (task(i), TaskStatus::NotDone)));
    let engine = DependencyEngine::new(MemoryEdgeStore::new(), statuses);

    for op in data.chunks_exact(3) {
        match op[0] % 8 {
            0..=4 => {
                let dep_type = if op[0] & 0x80 == 0 {
                    DependencyType::Blocks
                } else {
                    DependencyType::RelatesTo
                };
                match engine.create_dependency(&task(op[1]), &task(op[2]), dep_type) {
                    Ok(edge) => {
                        let edges = engine.edges().expect("memory store never fails");
                        assert!(edges.contains(&edge));
                    }
                    Err(DependencyError::CircularDependency { path }) => {
                        assert_eq!(dep_type, DependencyType::Blocks);
                        assert_eq!(path.first(), path.last());
                    }
                    Err(
                        DependencyError::SelfDependency(_) | DependencyError::DuplicateEdge { .. },
                    ) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            5 | 6 => {
                let edges = engine.edges().expect("memory store never fails");
                if !edges.is_empty() {
                    let id = edges[usize::from(op[1]) % edges.len()].id;
                    assert!(engine.delete_dependency(id).expect("delete").is_some());
                }
            }
            _ => {
                engine.remove_task(&task(op[1])).expect("remove task");
            }
        }

        let graph = GraphStore::from_edges(engine.edges().expect("memory store never fails"));
        assert!(!has_cycles(&graph));
    }
});
