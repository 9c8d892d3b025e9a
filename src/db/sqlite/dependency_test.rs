use crate::db::*;

async fn store() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store
}

async fn seed(store: &SqliteStore, titles: &[&str]) -> (Project, Vec<Task>) {
    let project = store
        .create_project(
            &NewProject {
                name: "graph".into(),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for title in titles {
        tasks.push(
            store
                .create_task(
                    &NewTask {
                        project_id: project.id,
                        title: (*title).into(),
                        ..Default::default()
                    },
                    SYSTEM_ACTOR,
                )
                .await
                .unwrap(),
        );
    }
    (project, tasks)
}

async fn set_status(store: &SqliteStore, task_id: Id, status: TaskStatus) {
    store
        .update_task(
            task_id,
            &TaskPatch {
                status: Some(status),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_self_dependency() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a"]).await;

    let err = store
        .add_dependency(tasks[0].id, tasks[0].id, DependencyKind::FinishToStart)
        .await;
    assert!(matches!(err, Err(DbError::InvalidInput { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_direct_and_transitive_cycles() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a", "b", "c"]).await;
    let (a, b, c) = (tasks[0].id, tasks[1].id, tasks[2].id);

    store
        .add_dependency(b, a, DependencyKind::FinishToStart)
        .await
        .unwrap();
    store
        .add_dependency(c, b, DependencyKind::FinishToStart)
        .await
        .unwrap();

    // a -> b would be direct; a -> c closes the long way around.
    assert!(matches!(
        store.add_dependency(a, b, DependencyKind::FinishToStart).await,
        Err(DbError::CircularDependency { .. })
    ));
    assert!(matches!(
        store.add_dependency(a, c, DependencyKind::FinishToStart).await,
        Err(DbError::CircularDependency { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_cross_project_edges_and_duplicates() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a", "b"]).await;
    let other = store
        .create_project(
            &NewProject {
                name: "other".into(),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap();
    let foreign = store
        .create_task(
            &NewTask {
                project_id: other.id,
                title: "x".into(),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap();

    assert!(matches!(
        store
            .add_dependency(tasks[0].id, foreign.id, DependencyKind::FinishToStart)
            .await,
        Err(DbError::InvalidInput { .. })
    ));

    store
        .add_dependency(tasks[0].id, tasks[1].id, DependencyKind::FinishToStart)
        .await
        .unwrap();
    assert!(matches!(
        store
            .add_dependency(tasks[0].id, tasks[1].id, DependencyKind::StartToStart)
            .await,
        Err(DbError::AlreadyExists { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn can_start_flips_per_kind() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["task", "finish_pred", "start_pred"]).await;
    let (t, fp, sp) = (tasks[0].id, tasks[1].id, tasks[2].id);

    store
        .add_dependency(t, fp, DependencyKind::FinishToStart)
        .await
        .unwrap();
    store
        .add_dependency(t, sp, DependencyKind::StartToStart)
        .await
        .unwrap();

    let (ok, unmet) = store.can_start(t).await.unwrap();
    assert!(!ok);
    assert_eq!(unmet.len(), 2);

    // Starting the start-to-start predecessor satisfies only that edge.
    set_status(&store, sp, TaskStatus::InProgress).await;
    let (ok, unmet) = store.can_start(t).await.unwrap();
    assert!(!ok);
    assert_eq!(unmet.len(), 1);
    assert_eq!(unmet[0].depends_on_id, fp);

    // in_progress is not enough for finish-to-start.
    set_status(&store, fp, TaskStatus::InProgress).await;
    let (ok, _) = store.can_start(t).await.unwrap();
    assert!(!ok);

    set_status(&store, fp, TaskStatus::Done).await;
    let (ok, unmet) = store.can_start(t).await.unwrap();
    assert!(ok);
    assert!(unmet.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn chains_hold_transitive_closure_only() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a", "b", "c", "d", "loner"]).await;
    let (a, b, c, d) = (tasks[0].id, tasks[1].id, tasks[2].id, tasks[3].id);

    // d -> c -> b -> a
    store.add_dependency(b, a, DependencyKind::FinishToStart).await.unwrap();
    store.add_dependency(c, b, DependencyKind::FinishToStart).await.unwrap();
    store.add_dependency(d, c, DependencyKind::FinishToStart).await.unwrap();

    let chains = store.dependency_chains(c).await.unwrap();
    let blocking: Vec<Id> = chains.blocking.iter().map(|t| t.id).collect();
    let blocked: Vec<Id> = chains.blocked.iter().map(|t| t.id).collect();
    assert_eq!(blocking, vec![a, b]);
    assert_eq!(blocked, vec![d]);

    let loner = store.dependency_chains(tasks[4].id).await.unwrap();
    assert!(loner.blocking.is_empty());
    assert!(loner.blocked.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn deep_chains_cannot_be_closed_into_a_cycle() {
    let store = store().await;
    let titles: Vec<String> = (0..70).map(|i| format!("t{}", i)).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (_, tasks) = seed(&store, &titles).await;

    // t[i] depends on t[i-1]: a 69-edge chain.
    for pair in tasks.windows(2) {
        store
            .add_dependency(pair[1].id, pair[0].id, DependencyKind::FinishToStart)
            .await
            .unwrap();
    }

    // The tail reaches the head however far apart they sit.
    assert!(matches!(
        store
            .add_dependency(tasks[0].id, tasks[69].id, DependencyKind::FinishToStart)
            .await,
        Err(DbError::CircularDependency { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn chains_walk_the_full_closure_on_long_graphs() {
    let store = store().await;
    let titles: Vec<String> = (0..70).map(|i| format!("t{}", i)).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (_, tasks) = seed(&store, &titles).await;

    for pair in tasks.windows(2) {
        store
            .add_dependency(pair[1].id, pair[0].id, DependencyKind::FinishToStart)
            .await
            .unwrap();
    }

    let tail = store.dependency_chains(tasks[69].id).await.unwrap();
    assert_eq!(tail.blocking.len(), 69);
    assert!(tail.blocked.is_empty());

    let head = store.dependency_chains(tasks[0].id).await.unwrap();
    assert!(head.blocking.is_empty());
    assert_eq!(head.blocked.len(), 69);
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_an_edge_is_idempotent() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a", "b"]).await;

    store
        .add_dependency(tasks[0].id, tasks[1].id, DependencyKind::FinishToStart)
        .await
        .unwrap();
    store
        .remove_dependency(tasks[0].id, tasks[1].id)
        .await
        .unwrap();
    // A second removal is a no-op, but the task itself must exist.
    store
        .remove_dependency(tasks[0].id, tasks[1].id)
        .await
        .unwrap();
    assert!(matches!(
        store.remove_dependency(9999, tasks[1].id).await,
        Err(DbError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn project_graph_holds_nodes_and_edges() {
    let store = store().await;
    let (project, tasks) = seed(&store, &["a", "b", "c"]).await;
    store
        .add_dependency(tasks[1].id, tasks[0].id, DependencyKind::FinishToStart)
        .await
        .unwrap();

    let graph = store.project_graph(project.id).await.unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].task_id, tasks[1].id);
    assert_eq!(graph.edges[0].depends_on_id, tasks[0].id);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_adds_cannot_close_a_cycle() {
    let store = store().await;
    let (_, tasks) = seed(&store, &["a", "b"]).await;
    let (a, b) = (tasks[0].id, tasks[1].id);

    let s1 = store.clone();
    let s2 = store.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { s1.add_dependency(a, b, DependencyKind::FinishToStart).await }),
        tokio::spawn(async move { s2.add_dependency(b, a, DependencyKind::FinishToStart).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let cyclic = results
        .iter()
        .filter(|r| matches!(r, Err(DbError::CircularDependency { .. })))
        .count();
    assert_eq!((ok, cyclic), (1, 1));
}
