use qbank_core::{
    generate_paper, BankSaveOutcome, CollectionName, MigrationOutcome, ProvisionError,
    QuestionBank, QuestionBankRepository, QuestionRecord, QuestionType, QuestionValidationError,
    RatioMap, RepoError, RoleInfo, RoleRepository, StoreConfig, StoreContext,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

fn db_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("bank.sqlite3")
}

fn context(dir: &tempfile::TempDir) -> StoreContext {
    StoreContext::new(StoreConfig::new(db_path(dir)))
}

fn question(id: &str, kind: QuestionType, score: f64) -> QuestionRecord {
    let record = QuestionRecord::new(id, kind, format!("title {id}"), "answer", score);
    if kind.requires_options() {
        record.with_options(["A", "B", "C"])
    } else {
        record
    }
}

fn ids(bank: &QuestionBank, kind: QuestionType) -> Vec<String> {
    bank.questions(kind)
        .iter()
        .map(|question| question.id.clone())
        .collect()
}

async fn register(ctx: &StoreContext, role_id: &str) {
    ctx.roles()
        .save(&RoleInfo::with_id(role_id, format!("Role {role_id}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn save_for_unknown_role_is_rejected_without_migration() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let bank = QuestionBank::from_questions([question("a1", QuestionType::SingleChoice, 5.0)]);

    let err = ctx.banks().save("ghost", &bank, false).await.unwrap_err();
    assert!(matches!(err, RepoError::RoleNotFound(ref id) if id == "ghost"));
    assert_eq!(ctx.provisioner().current_version().await.unwrap(), 1);
}

#[tokio::test]
async fn replace_round_trips_and_provisions_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let bank = QuestionBank::from_questions([
        question("a1", QuestionType::SingleChoice, 5.0),
        question("a2", QuestionType::TrueFalse, 2.0),
    ]);
    let outcome = ctx.banks().save("r1", &bank, false).await.unwrap();
    assert_eq!(outcome, BankSaveOutcome::Replaced);
    assert_eq!(ctx.provisioner().current_version().await.unwrap(), 2);

    let replacement =
        QuestionBank::from_questions([question("b1", QuestionType::ShortAnswer, 10.0)]);
    ctx.banks().save("r1", &replacement, false).await.unwrap();
    assert_eq!(ctx.provisioner().current_version().await.unwrap(), 2);

    let stored = ctx.banks().get("r1").await.unwrap().unwrap();
    assert_eq!(stored, replacement);
    assert!(stored.questions(QuestionType::SingleChoice).is_empty());
}

#[tokio::test]
async fn append_concatenates_per_type_and_keeps_other_types() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let first = QuestionBank::from_questions([
        question("a1", QuestionType::SingleChoice, 5.0),
        question("a2", QuestionType::SingleChoice, 5.0),
        question("a3", QuestionType::ShortAnswer, 10.0),
    ]);
    let second = QuestionBank::from_questions([
        question("b1", QuestionType::SingleChoice, 5.0),
        question("b2", QuestionType::TrueFalse, 2.0),
    ]);

    ctx.banks().save("r1", &first, false).await.unwrap();
    let outcome = ctx.banks().save("r1", &second, true).await.unwrap();
    assert_eq!(outcome, BankSaveOutcome::Merged);

    let stored = ctx.banks().get("r1").await.unwrap().unwrap();
    assert_eq!(ids(&stored, QuestionType::SingleChoice), ["a1", "a2", "b1"]);
    assert_eq!(ids(&stored, QuestionType::ShortAnswer), ["a3"]);
    assert_eq!(ids(&stored, QuestionType::TrueFalse), ["b2"]);
    assert_eq!(stored.len(), 5);
}

#[tokio::test]
async fn appending_the_same_bank_twice_keeps_ids_unique() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let bank = QuestionBank::from_questions([
        question("q1", QuestionType::TrueFalse, 5.0),
        question("q2", QuestionType::TrueFalse, 5.0),
    ]);
    ctx.banks().save("r1", &bank, false).await.unwrap();
    let outcome = ctx.banks().save("r1", &bank, true).await.unwrap();
    assert_eq!(outcome, BankSaveOutcome::Merged);

    let stored = ctx.banks().get("r1").await.unwrap().unwrap();
    assert_eq!(ids(&stored, QuestionType::TrueFalse), ["q1", "q2"]);

    let ratios: RatioMap = [(QuestionType::TrueFalse, 1.0)].into_iter().collect();
    let paper = generate_paper(Some(&stored), &ratios, 100.0);
    let unique: HashSet<_> = paper.list.iter().map(|question| &question.id).collect();
    assert_eq!(unique.len(), paper.list.len());
    assert_eq!(paper.total_score, 10.0);
}

#[tokio::test]
async fn bank_repeating_an_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let bank = QuestionBank::from_questions([
        question("q1", QuestionType::TrueFalse, 5.0),
        question("q1", QuestionType::FillBlank, 5.0),
    ]);
    let err = ctx.banks().save("r1", &bank, false).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidQuestion(QuestionValidationError::DuplicateId(ref id)) if id == "q1"
    ));
    assert!(ctx.banks().get("r1").await.unwrap().is_none());
}

#[tokio::test]
async fn append_to_empty_collection_stores_incoming_bank() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let bank = QuestionBank::from_questions([question("a1", QuestionType::FillBlank, 3.0)]);
    let outcome = ctx.banks().save("r1", &bank, true).await.unwrap();

    assert_eq!(outcome, BankSaveOutcome::Merged);
    assert_eq!(ctx.banks().get("r1").await.unwrap().unwrap(), bank);
}

#[tokio::test]
async fn unreadable_stored_bank_falls_back_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let previous = QuestionBank::from_questions([question("a1", QuestionType::TrueFalse, 2.0)]);
    ctx.banks().save("r1", &previous, false).await.unwrap();

    let collection = CollectionName::for_role("r1").unwrap();
    let conn = Connection::open(db_path(&dir)).unwrap();
    conn.execute(
        &format!("UPDATE \"{}\" SET value = 'not json';", collection.as_str()),
        [],
    )
    .unwrap();
    drop(conn);

    let incoming = QuestionBank::from_questions([question("b1", QuestionType::TrueFalse, 2.0)]);
    let outcome = ctx.banks().save("r1", &incoming, true).await.unwrap();
    assert!(matches!(outcome, BankSaveOutcome::MergeFallback { .. }));

    assert_eq!(ctx.banks().get("r1").await.unwrap().unwrap(), incoming);
}

#[tokio::test]
async fn get_returns_none_without_questions() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);

    assert!(ctx.banks().get("ghost").await.unwrap().is_none());
    assert!(ctx.banks().get("").await.unwrap().is_none());

    register(&ctx, "r1").await;
    assert!(ctx.banks().get("r1").await.unwrap().is_none());

    assert_eq!(
        ctx.provisioner().ensure_role_collection("r1").await.unwrap(),
        MigrationOutcome::Migrated {
            from_version: 1,
            to_version: 2,
            repaired: 0
        }
    );
    assert!(ctx.banks().get("r1").await.unwrap().is_none());

    let mut hollow = QuestionBank::new();
    hollow.insert(QuestionType::SingleChoice, Vec::new());
    ctx.banks().save("r1", &hollow, false).await.unwrap();
    assert!(ctx.banks().get("r1").await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_questions_are_rejected_before_storage() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    register(&ctx, "r1").await;

    let missing_options = QuestionBank::from_questions([QuestionRecord::new(
        "a1",
        QuestionType::MultipleChoice,
        "title",
        "A,B",
        5.0,
    )]);
    let err = ctx
        .banks()
        .save("r1", &missing_options, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidQuestion(_)));

    let zero_score =
        QuestionBank::from_questions([question("a2", QuestionType::ShortAnswer, 0.0)]);
    let err = ctx
        .banks()
        .save("r1", &zero_score, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidQuestion(_)));

    assert_eq!(ctx.provisioner().current_version().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_role_id_surfaces_before_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let bank = QuestionBank::from_questions([question("a1", QuestionType::TrueFalse, 2.0)]);

    let err = ctx.banks().save("   ", &bank, false).await.unwrap_err();
    assert!(matches!(err, RepoError::InvalidRoleId(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_saves_provision_each_role_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(context(&dir));
    let role_ids = ["r1", "r2", "r3"];
    for role_id in role_ids {
        register(&ctx, role_id).await;
    }

    let mut tasks = JoinSet::new();
    for (index, role_id) in role_ids.iter().cycle().take(6).enumerate() {
        let ctx = Arc::clone(&ctx);
        let role_id = role_id.to_string();
        tasks.spawn(async move {
            let bank = QuestionBank::from_questions([question(
                &format!("{role_id}_{index}"),
                QuestionType::TrueFalse,
                1.0,
            )]);
            ctx.banks().save(&role_id, &bank, true).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let version = ctx.provisioner().current_version().await.unwrap();
    assert!(version > 1 && version <= 1 + role_ids.len() as u32);

    for role_id in role_ids {
        let stored = ctx.banks().get(role_id).await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(matches!(
            ctx.provisioner().ensure_role_collection(role_id).await,
            Ok(MigrationOutcome::AlreadyPresent)
        ));
    }
}

#[tokio::test]
async fn provisioning_failure_propagates_as_provision_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let ctx = StoreContext::new(
        StoreConfig::new(&path)
            .with_migration_timeout(std::time::Duration::from_millis(200))
            .with_busy_timeout(std::time::Duration::from_millis(500)),
    );
    register(&ctx, "r1").await;

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let bank = QuestionBank::from_questions([question("a1", QuestionType::TrueFalse, 2.0)]);
    let err = ctx.banks().save("r1", &bank, false).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Provision(ProvisionError::MigrationTimeout { .. })
    ));

    blocker.execute_batch("ROLLBACK;").unwrap();
    assert!(ctx.banks().get("r1").await.unwrap().is_none());
}
