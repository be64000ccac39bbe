//! Integration tests for the ADT to FHIR transform

use hl7_relay::adapters::memory::MemoryStore;
use hl7_relay::core::mapping::IdentityMapper;
use hl7_relay::core::transform::{transform, ResourceBundle, TransformError, TransformProfile};
use hl7_relay::hl7::Hl7Message;
use serde_json::Value;
use std::sync::Arc;

const ADMIT: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240105101500||ADT^A01|MSG0001|P|2.3\r\
EVN|A01|20240105101500\r\
PID|1||100234^^^RQX^MR||SMITH^JOHN||19700101|M\r\
PV1|1|I|WARD1^BAY2^BED3^RQX||||C123^JONES^ANNA||||||||||||V998^^^RQX^VN|||||||||||||||||||||||||20240105101500";

const UPDATE: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240106090000||ADT^A08|MSG0002|P|2.3\r\
EVN|A08|20240106090000\r\
PID|1||100234^^^RQX^MR||SMITH^JOHN||19700101|M\r\
PV1|1|I|WARD1^BAY2^BED3^RQX||||C123^JONES^ANNA||||||||||||V998^^^RQX^VN|||||||||||||||||||||||||20240105101500";

const MINOR_ADMIT: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240101080000||ADT^A01|MSG0100|P|2.3\r\
EVN|A01|20240101080000\r\
PID|1||100111^^^RQX^MR||SMITH^J||19700101|M\r\
PV1|1|I|WARD1^^^RQX||||||||||||||||V500^^^RQX^VN|||||||||||||||||||||||||20240101080000";

const MERGE: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240107120000||ADT^A34|MSG0200|P|2.3\r\
EVN|A34|20240107120000\r\
PID|1||100234^^^RQX^MR||SMITH^JOHN||19700101|M\r\
MRG|100111^^^RQX^MR";

fn mapper() -> IdentityMapper {
    IdentityMapper::new(Arc::new(MemoryStore::new()))
}

async fn run(
    payload: &str,
    profile: &TransformProfile,
    mapper: &IdentityMapper,
) -> Result<ResourceBundle, TransformError> {
    let message = Hl7Message::parse(payload).unwrap();
    transform(&message, profile, mapper).await
}

fn entries(bundle: &ResourceBundle) -> &Vec<Value> {
    bundle.bundle["entry"].as_array().unwrap()
}

fn resources_of<'a>(bundle: &'a ResourceBundle, resource_type: &str) -> Vec<&'a Value> {
    entries(bundle)
        .iter()
        .map(|entry| &entry["resource"])
        .filter(|resource| resource["resourceType"] == resource_type)
        .collect()
}

fn id_of(bundle: &ResourceBundle, resource_type: &str) -> String {
    resources_of(bundle, resource_type)[0]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn named<'a>(parameters: &'a [Value], name: &str) -> Vec<&'a Value> {
    parameters.iter().filter(|p| p["name"] == name).collect()
}

#[tokio::test]
async fn test_admission_produces_full_bundle() {
    let mapper = mapper();
    let bundle = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();

    let types: Vec<&str> = entries(&bundle)
        .iter()
        .map(|entry| entry["resource"]["resourceType"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec![
            "MessageHeader",
            "Organization",
            "Location",
            "Location",
            "Practitioner",
            "Patient",
            "EpisodeOfCare",
            "Encounter",
        ]
    );
    assert_eq!(bundle.entry_count(), 8);
    assert_eq!(bundle.bundle["type"], "message");
}

#[tokio::test]
async fn test_header_leads_and_references_every_resource() {
    let mapper = mapper();
    let bundle = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();

    let header = &entries(&bundle)[0]["resource"];
    assert_eq!(header["id"], bundle.id.to_string());
    assert_eq!(bundle.bundle["id"], bundle.id.to_string());
    assert_eq!(header["event"]["code"], "A01");

    let data = header["data"].as_array().unwrap();
    assert_eq!(data.len(), bundle.entry_count() - 1);
    for entry in entries(&bundle).iter().skip(1) {
        let resource = &entry["resource"];
        let reference = format!(
            "{}/{}",
            resource["resourceType"].as_str().unwrap(),
            resource["id"].as_str().unwrap()
        );
        assert!(data.iter().any(|d| d["reference"] == reference.as_str()));
    }
}

#[tokio::test]
async fn test_same_message_transforms_identically() {
    let mapper = mapper();
    let first = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();
    let second = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[tokio::test]
async fn test_entities_keep_their_ids_across_messages() {
    let mapper = mapper();
    let admit = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();
    let update = run(UPDATE, &TransformProfile::default(), &mapper).await.unwrap();

    for resource_type in ["Patient", "EpisodeOfCare", "Encounter", "Practitioner", "Organization"] {
        assert_eq!(
            id_of(&admit, resource_type),
            id_of(&update, resource_type),
            "{resource_type} id changed between messages"
        );
    }
    assert_ne!(admit.id, update.id);
}

#[tokio::test]
async fn test_encounter_links_patient_episode_and_location() {
    let mapper = mapper();
    let bundle = run(ADMIT, &TransformProfile::default(), &mapper).await.unwrap();

    let encounter = resources_of(&bundle, "Encounter")[0];
    assert_eq!(
        encounter["patient"]["reference"],
        format!("Patient/{}", id_of(&bundle, "Patient"))
    );
    assert_eq!(
        encounter["episodeOfCare"][0]["reference"],
        format!("EpisodeOfCare/{}", id_of(&bundle, "EpisodeOfCare"))
    );
    assert_eq!(encounter["status"], "in-progress");

    let locations = resources_of(&bundle, "Location");
    let ward = locations
        .iter()
        .find(|l| l["name"] == "BED3")
        .expect("encounter location");
    assert_eq!(ward["description"], "WARD1/BAY2/BED3");
    assert_eq!(
        encounter["location"][0]["location"]["reference"],
        format!("Location/{}", ward["id"].as_str().unwrap())
    );
}

#[tokio::test]
async fn test_missing_patient_segment_names_the_segment() {
    let payload = ADMIT.replace("PID|1||100234^^^RQX^MR||SMITH^JOHN||19700101|M\r", "");
    let err = run(&payload, &TransformProfile::default(), &mapper())
        .await
        .unwrap_err();

    assert!(matches!(err, TransformError::Invalid(_)));
    assert_eq!(err.to_string(), "PID segment exists less than 1 time(s)");
}

#[tokio::test]
async fn test_unexpected_sending_facility_is_rejected() {
    let profile = TransformProfile {
        sending_facility: Some("RAL".to_string()),
        ..TransformProfile::default()
    };
    let err = run(ADMIT, &profile, &mapper()).await.unwrap_err();
    assert_eq!(err.to_string(), "Sending facility of RQX not recognised");
}

#[tokio::test]
async fn test_patient_identifier_without_qualifier_is_rejected() {
    let payload = ADMIT.replace("100234^^^RQX^MR", "100234");
    let err = run(&payload, &TransformProfile::default(), &mapper())
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::Invalid(_)));
}

#[tokio::test]
async fn test_merge_remaps_minor_patient_resources() {
    let mapper = mapper();
    let minor = run(MINOR_ADMIT, &TransformProfile::default(), &mapper)
        .await
        .unwrap();
    let minor_episode = id_of(&minor, "EpisodeOfCare");
    let minor_patient = id_of(&minor, "Patient");

    let merge = run(MERGE, &TransformProfile::default(), &mapper).await.unwrap();
    let parameters = resources_of(&merge, "Parameters");
    assert_eq!(parameters.len(), 1);

    let parameter = parameters[0]["parameter"].as_array().unwrap();

    assert_eq!(
        named(parameter, "MinorPatientIdentifier")[0]["valueString"],
        "100111"
    );
    assert_eq!(
        named(parameter, "MajorPatientIdentifier")[0]["valueString"],
        "100234"
    );
    assert_eq!(
        named(parameter, "MinorPatient")[0]["valueReference"]["reference"],
        format!("Patient/{minor_patient}")
    );

    // Episode and encounter of the minor patient move under the major patient
    let remapped = named(parameter, "RemappedResource");
    assert_eq!(remapped.len(), 2);
    let old_episode = format!("EpisodeOfCare/{minor_episode}");
    let episode_part = remapped
        .iter()
        .find(|p| p["part"][0]["valueReference"]["reference"] == old_episode.as_str())
        .expect("episode remapped");
    assert_ne!(
        episode_part["part"][1]["valueReference"]["reference"],
        old_episode.as_str()
    );
}

#[tokio::test]
async fn test_merge_is_repeatable() {
    let mapper = mapper();
    run(MINOR_ADMIT, &TransformProfile::default(), &mapper)
        .await
        .unwrap();

    let first = run(MERGE, &TransformProfile::default(), &mapper).await.unwrap();
    let second = run(MERGE, &TransformProfile::default(), &mapper).await.unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}
