
use serde_json::json;
use test_support::{
    request, request_ok, seed_session, seed_tesoretto, spawn_daemon, temp_dir, wait_ready,
};

#[test]
fn teacher_creation_validates_and_rejects_duplicates() {
    let workspace = temp_dir("recuperod-teachers-create");
    let (_child, mut stdin, mut reader) = spawn_daemon(&workspace);
    wait_ready(&mut stdin, &mut reader);
    seed_session(&workspace, "tok");

    let missing = request(
        &mut stdin,
        &mut reader,
        "1",
        "POST",
        "/teachers",
        json!({}),
        json!({ "nome": "Mario" }),
        Some("tok"),
    );
    assert_eq!(missing["status"].as_u64(), Some(400));
    assert_eq!(missing["body"]["error"].as_str(), Some("missing cognome"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "POST",
        "/teachers",
        json!({}),
        json!({ "cognome": "Rossi", "nome": "Mario", "email": "m.rossi@scuola.it" }),
        Some("tok"),
    );
    assert_eq!(created["teacher"]["cognome"].as_str(), Some("Rossi"));
    assert!(created["teacher"]["id"].as_str().is_some());

    // Case-insensitive name match blocks the duplicate.
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "POST",
        "/teachers",
        json!({}),
        json!({ "cognome": "ROSSI", "nome": "mario" }),
        Some("tok"),
    );
    assert_eq!(dup["status"].as_u64(), Some(400));
}

#[test]
fn teacher_listing_nests_budget_history() {
    let workspace = temp_dir("recuperod-teachers-list");
    let (_child, mut stdin, mut reader) = spawn_daemon(&workspace);
    wait_ready(&mut stdin, &mut reader);
    seed_session(&workspace, "tok");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "POST",
        "/teachers",
        json!({}),
        json!({ "cognome": "Bianchi", "nome": "Anna" }),
        Some("tok"),
    );
    let teacher_id = created["teacher"]["id"].as_str().expect("id").to_string();

    let year = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "POST",
        "/school-years",
        json!({}),
        json!({ "name": "2025/2026", "active": true }),
        Some("tok"),
    );
    let year_id = year["schoolYear"]["id"].as_str().expect("year id").to_string();
    seed_tesoretto(&workspace, &teacher_id, &year_id, 36000.0, 36000.0);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "GET",
        "/teachers",
        json!({}),
        json!({}),
        Some("tok"),
    );
    let teachers = listed["teachers"].as_array().expect("teachers");
    assert_eq!(teachers.len(), 1);
    let budgets = teachers[0]["budgets"].as_array().expect("budgets");
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0]["schoolYearName"].as_str(), Some("2025/2026"));
    assert_eq!(budgets[0]["minutiAnnui"].as_f64(), Some(36000.0));
    assert_eq!(budgets[0]["saldo"].as_f64(), Some(36000.0));
}

#[test]
fn budget_listing_honors_filters() {
    let workspace = temp_dir("recuperod-budget-filters");
    let (_child, mut stdin, mut reader) = spawn_daemon(&workspace);
    wait_ready(&mut stdin, &mut reader);
    seed_session(&workspace, "tok");

    let t1 = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "POST",
        "/teachers",
        json!({}),
        json!({ "cognome": "Rossi", "nome": "Mario" }),
        Some("tok"),
    )["teacher"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    let t2 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "POST",
        "/teachers",
        json!({}),
        json!({ "cognome": "Verdi", "nome": "Luca" }),
        Some("tok"),
    )["teacher"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let y1 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "POST",
        "/school-years",
        json!({}),
        json!({ "name": "2024/2025" }),
        Some("tok"),
    )["schoolYear"]["id"]
        .as_str()
        .expect("year id")
        .to_string();
    let y2 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "POST",
        "/school-years",
        json!({}),
        json!({ "name": "2025/2026", "active": true }),
        Some("tok"),
    )["schoolYear"]["id"]
        .as_str()
        .expect("year id")
        .to_string();

    seed_tesoretto(&workspace, &t1, &y1, 30000.0, 30000.0);
    seed_tesoretto(&workspace, &t1, &y2, 36000.0, 36000.0);
    seed_tesoretto(&workspace, &t2, &y2, 20000.0, 20000.0);

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "GET",
        "/budgets",
        json!({}),
        json!({}),
        Some("tok"),
    );
    assert_eq!(all["budgets"].as_array().map(|a| a.len()), Some(3));

    let by_teacher = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "GET",
        "/budgets",
        json!({ "teacherId": t1 }),
        json!({}),
        Some("tok"),
    );
    assert_eq!(by_teacher["budgets"].as_array().map(|a| a.len()), Some(2));

    let by_both = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "GET",
        "/budgets",
        json!({ "teacherId": t1, "schoolYearId": y1 }),
        json!({}),
        Some("tok"),
    );
    let budgets = by_both["budgets"].as_array().expect("budgets");
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0]["minutiAnnui"].as_f64(), Some(30000.0));
    assert_eq!(budgets[0]["cognome"].as_str(), Some("Rossi"));
}
