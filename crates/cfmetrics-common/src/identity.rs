pub const ORG_NAME_LABEL: &str = "org_name";
pub const SPACE_NAME_LABEL: &str = "space_name";
pub const APP_NAME_LABEL: &str = "app_name";
pub const INSTANCE_ID_LABEL: &str = "cf_instance_id";
pub const INSTANCE_NUMBER_LABEL: &str = "cf_instance_number";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    org_name: String,
    space_name: String,
    app_name: String,
    instance_id: String,
    instance_number: u32,
}

impl IdentityContext {
    pub fn new(
        org_name: impl Into<String>,
        space_name: impl Into<String>,
        app_name: impl Into<String>,
        app_guid: &str,
        instance_number: u32,
    ) -> Self {
        Self {
            org_name: org_name.into(),
            space_name: space_name.into(),
            app_name: app_name.into(),
            instance_id: instance_id(app_guid, instance_number),
            instance_number,
        }
    }

    pub fn labels(&self) -> [(&'static str, String); 5] {
        [
            (ORG_NAME_LABEL, self.org_name.clone()),
            (SPACE_NAME_LABEL, self.space_name.clone()),
            (APP_NAME_LABEL, self.app_name.clone()),
            (INSTANCE_ID_LABEL, self.instance_id.clone()),
            (INSTANCE_NUMBER_LABEL, self.instance_number.to_string()),
        ]
    }
}

pub fn instance_id(app_guid: &str, instance_number: u32) -> String {
    format!("{app_guid}:{instance_number}")
}
