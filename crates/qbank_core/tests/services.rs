use qbank_core::{
    BankSaveOutcome, ImportService, PaperService, QuestionBankRepository, QuestionType, RatioMap,
    RepoError, RoleInfo, RoleRepository, ServiceError, StoreConfig, StoreContext,
    ValidationError,
};

const IMPORT_JSON: &str = r#"[
    {"type": 1, "title": "2 + 2 = ?", "options": ["3", "4"], "answer": "4", "score": 5},
    {"type": "true_false", "title": "Rust has a garbage collector.", "answer": false, "score": 2},
    {"type": "简答题", "title": "Explain ownership.", "answer": "...", "score": 10, "difficulty": 3}
]"#;

fn context(dir: &tempfile::TempDir) -> StoreContext {
    StoreContext::new(StoreConfig::new(dir.path().join("bank.sqlite3")))
}

#[tokio::test]
async fn import_then_generate_paper() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    ctx.roles()
        .save(&RoleInfo::with_id("r1", "Rust Engineer"))
        .await
        .unwrap();

    let summary = ImportService::new(ctx.banks())
        .import_json("r1", IMPORT_JSON, false)
        .await
        .unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.outcome, BankSaveOutcome::Replaced);

    let stored = ctx.banks().get("r1").await.unwrap().unwrap();
    assert_eq!(stored.questions(QuestionType::TrueFalse)[0].answer, "false");
    assert_eq!(stored.questions(QuestionType::ShortAnswer)[0].difficulty, 3.0);

    let ratios: RatioMap = QuestionType::ALL.iter().map(|kind| (*kind, 1.0)).collect();
    let paper = PaperService::new(ctx.banks())
        .generate_for_role("r1", &ratios, 100.0)
        .await
        .unwrap();
    assert_eq!(paper.list.len(), 3);
    assert_eq!(paper.total_score, 17.0);
    assert_eq!(paper.shortfall, Some(83.0));
}

#[tokio::test]
async fn appending_import_merges_into_existing_bank() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    ctx.roles()
        .save(&RoleInfo::with_id("r1", "Rust Engineer"))
        .await
        .unwrap();
    let service = ImportService::new(ctx.banks());

    service.import_json("r1", IMPORT_JSON, false).await.unwrap();
    let summary = service.import_json("r1", IMPORT_JSON, true).await.unwrap();
    assert_eq!(summary.outcome, BankSaveOutcome::Merged);

    let stored = ctx.banks().get("r1").await.unwrap().unwrap();
    assert_eq!(stored.len(), 6);
    assert_eq!(stored.questions(QuestionType::SingleChoice).len(), 2);
}

#[tokio::test]
async fn rejected_import_leaves_bank_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    ctx.roles()
        .save(&RoleInfo::with_id("r1", "Rust Engineer"))
        .await
        .unwrap();
    let service = ImportService::new(ctx.banks());
    service.import_json("r1", IMPORT_JSON, false).await.unwrap();

    let err = service.import_json("r1", "{not json", false).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::Malformed(_))));

    let err = service
        .import_json(
            "r1",
            r#"[{"type": 9, "title": "t", "answer": "a", "score": 1}]"#,
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::UnknownType { position: 1, .. })
    ));

    assert_eq!(ctx.banks().get("r1").await.unwrap().unwrap().len(), 3);
}

#[tokio::test]
async fn import_for_unknown_role_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);

    let err = ImportService::new(ctx.banks())
        .import_json("ghost", IMPORT_JSON, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repo(RepoError::RoleNotFound(_))));
}

#[tokio::test]
async fn paper_for_role_without_bank_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let ratios: RatioMap = [(QuestionType::SingleChoice, 1.0)].into_iter().collect();

    let paper = PaperService::new(ctx.banks())
        .generate_for_role("ghost", &ratios, 50.0)
        .await
        .unwrap();
    assert!(paper.list.is_empty());
    assert_eq!(paper.shortfall, None);
}
