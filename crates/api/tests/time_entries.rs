mod common;

use common::*;
use serde_json::{json, Value};

const CREATE: &str = r#"
    mutation Create($input: NewTimeEntryInput!) {
        attendance {
            createTimeEntry(input: $input) {
                id userId date startTime endTime hoursWorked projectName description
            }
        }
    }
"#;

const UPDATE: &str = r#"
    mutation Update($input: UpdateTimeEntryInput!) {
        attendance {
            updateTimeEntry(input: $input) { id startTime endTime hoursWorked projectId }
        }
    }
"#;

const DELETE: &str = r#"
    mutation Delete($id: ID!) { attendance { deleteTimeEntry(id: $id) } }
"#;

fn entry(project_id: &str, date: &str, start: &str, end: &str) -> Value {
    json!({
        "date": date,
        "startTime": start,
        "endTime": end,
        "projectId": project_id,
        "description": "Sprint planning"
    })
}

#[tokio::test]
async fn employee_records_work_with_derived_hours() {
    let app = TestApp::new().await;
    let jan = app.jan().await;
    let project = app.project_id("Interní vývoj");

    let response = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-04", "08:00", "16:30") }),
            Some(&jan),
        )
        .await;
    let created = data(&response)["attendance"]["createTimeEntry"].clone();
    assert_eq!(created["userId"], json!(jan.user_id.to_string()));
    assert_eq!(created["date"], json!("2025-03-04"));
    assert_eq!(created["startTime"], json!("08:00"));
    assert_eq!(created["hoursWorked"], json!(8.5));
    assert_eq!(created["projectName"], json!("Interní vývoj"));

    let response = app
        .execute(
            r#"query($id: ID!) { attendance { timeEntry(id: $id) { hoursWorked description } } }"#,
            json!({ "id": created["id"] }),
            Some(&jan),
        )
        .await;
    assert_eq!(
        data(&response)["attendance"]["timeEntry"],
        json!({ "hoursWorked": 8.5, "description": "Sprint planning" })
    );
}

#[tokio::test]
async fn inline_edit_recomputes_hours() {
    let app = TestApp::new().await;
    let jan = app.jan().await;
    let project = app.project_id("Interní vývoj");
    let other_project = app.project_id("Zákaznická podpora");
    let created = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-04", "08:00", "12:00") }),
            Some(&jan),
        )
        .await;
    let id = data(&created)["attendance"]["createTimeEntry"]["id"].clone();

    let mut input = entry(&other_project, "2025-03-04", "09:15", "10:00");
    input["id"] = id.clone();
    let response = app.execute(UPDATE, json!({ "input": input }), Some(&jan)).await;
    let updated = data(&response)["attendance"]["updateTimeEntry"].clone();
    assert_eq!(updated["id"], id);
    assert_eq!(updated["hoursWorked"], json!(0.75));
    assert_eq!(updated["projectId"], json!(other_project));
}

#[tokio::test]
async fn end_before_start_is_rejected_on_edit() {
    let app = TestApp::new().await;
    let jan = app.jan().await;
    let project = app.project_id("Interní vývoj");
    let created = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-04", "08:00", "12:00") }),
            Some(&jan),
        )
        .await;
    let id = data(&created)["attendance"]["createTimeEntry"]["id"].clone();

    for (start, end) in [("12:00", "08:00"), ("09:00", "09:00")] {
        let mut input = entry(&project, "2025-03-04", start, end);
        input["id"] = id.clone();
        let response = app.execute(UPDATE, json!({ "input": input }), Some(&jan)).await;
        assert_eq!(error_code(&response).as_deref(), Some("VALIDATION"));
        assert_eq!(
            field_errors(&response)["endTime"],
            json!("End time must be after start time")
        );
    }

    let unchanged = app
        .store
        .time_entry(id.as_str().unwrap().parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.hours_worked, 4.0);
}

#[tokio::test]
async fn missing_fields_are_reported_together() {
    let app = TestApp::new().await;
    let jan = app.jan().await;
    let response = app
        .execute(CREATE, json!({ "input": entry("", "", "", "") }), Some(&jan))
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("VALIDATION"));
    let fields = field_errors(&response);
    assert_eq!(fields["date"], json!("Date is required"));
    assert_eq!(fields["startTime"], json!("Start time is required"));
    assert_eq!(fields["endTime"], json!("End time is required"));
    assert_eq!(fields["projectId"], json!("Project is required"));
}

#[tokio::test]
async fn inactive_project_only_blocks_new_entries() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let jan = app.jan().await;
    let project = app.project_id("Web pro klienta");
    let created = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-05", "08:00", "10:00") }),
            Some(&jan),
        )
        .await;
    let id = data(&created)["attendance"]["createTimeEntry"]["id"].clone();

    let response = app
        .execute(
            r#"mutation($id: ID!) {
                attendance { updateProject(input: { id: $id, isActive: false }) { isActive } }
            }"#,
            json!({ "id": project }),
            Some(&admin),
        )
        .await;
    assert_eq!(
        data(&response)["attendance"]["updateProject"]["isActive"],
        json!(false)
    );

    let response = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-06", "08:00", "10:00") }),
            Some(&jan),
        )
        .await;
    assert_eq!(field_errors(&response)["projectId"], json!("Project is not active"));

    let mut input = entry(&project, "2025-03-05", "08:00", "11:00");
    input["id"] = id;
    let response = app.execute(UPDATE, json!({ "input": input }), Some(&jan)).await;
    assert_eq!(
        data(&response)["attendance"]["updateTimeEntry"]["hoursWorked"],
        json!(3.0)
    );
}

#[tokio::test]
async fn employees_cannot_touch_other_entries() {
    let app = TestApp::new().await;
    let jan = app.jan().await;
    let marie = app.marie().await;
    let project = app.project_id("Interní vývoj");
    let created = app
        .execute(
            CREATE,
            json!({ "input": entry(&project, "2025-03-04", "08:00", "12:00") }),
            Some(&jan),
        )
        .await;
    let id = data(&created)["attendance"]["createTimeEntry"]["id"].clone();

    let mut input = entry(&project, "2025-03-04", "08:00", "09:00");
    input["id"] = id.clone();
    let response = app.execute(UPDATE, json!({ "input": input }), Some(&marie)).await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let response = app.execute(DELETE, json!({ "id": id }), Some(&marie)).await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let response = app
        .execute(
            r#"query($userId: ID) { attendance { timeEntries(userId: $userId) { id } } }"#,
            json!({ "userId": jan.user_id.to_string() }),
            Some(&marie),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let mut foreign = entry(&project, "2025-03-04", "08:00", "09:00");
    foreign["userId"] = json!(jan.user_id.to_string());
    let response = app
        .execute(CREATE, json!({ "input": foreign }), Some(&marie))
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn admin_manages_entries_of_others() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let marie = app.marie().await;
    let project = app.project_id("Zákaznická podpora");

    let mut input = entry(&project, "2025-02-10", "07:00", "15:00");
    input["userId"] = json!(marie.user_id.to_string());
    let response = app.execute(CREATE, json!({ "input": input }), Some(&admin)).await;
    let created = data(&response)["attendance"]["createTimeEntry"].clone();
    assert_eq!(created["userId"], json!(marie.user_id.to_string()));
    assert_eq!(created["hoursWorked"], json!(8.0));

    let listed = app
        .execute(
            r#"query { attendance { timeEntries(from: "2025-02-01", to: "2025-02-28") { id } } }"#,
            json!({}),
            Some(&marie),
        )
        .await;
    assert_eq!(
        data(&listed)["attendance"]["timeEntries"],
        json!([{ "id": created["id"] }])
    );

    let response = app
        .execute(DELETE, json!({ "id": created["id"] }), Some(&admin))
        .await;
    assert_eq!(data(&response)["attendance"]["deleteTimeEntry"], json!(true));
    let response = app
        .execute(DELETE, json!({ "id": created["id"] }), Some(&admin))
        .await;
    assert_eq!(data(&response)["attendance"]["deleteTimeEntry"], json!(false));
}
