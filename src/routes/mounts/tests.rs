use super::dto::MountInfo;
use crate::{
    mount::MountOptions,
    test::{create_test_rocket_instance, helpers::user_header},
};
use rocket::{
    http::{Accept, Status},
    local::asynchronous::Client,
};

#[rocket::async_test]
async fn test_list_mounts() {
    let (rocket, _dir_dropper) = create_test_rocket_instance().await;
    let client = Client::tracked(rocket).await.unwrap();

    let response = client
        .get("/mounts")
        .header(Accept::JSON)
        .header(user_header())
        .dispatch()
        .await;

    let status = response.status();
    let mounts = response.into_json::<Vec<MountInfo>>().await.unwrap();

    assert_eq!(status, Status::Ok);
    assert_eq!(
        mounts,
        vec![
            MountInfo {
                prefix: "/home".to_owned(),
                storage_id: "home".to_owned(),
                options: MountOptions::default(),
            },
            MountInfo {
                prefix: "/archive".to_owned(),
                storage_id: "archive".to_owned(),
                options: MountOptions {
                    read_only: true,
                    sharing_disabled: false,
                },
            },
            MountInfo {
                prefix: "/project".to_owned(),
                storage_id: "project".to_owned(),
                options: MountOptions {
                    read_only: false,
                    sharing_disabled: true,
                },
            },
        ]
    );
}
