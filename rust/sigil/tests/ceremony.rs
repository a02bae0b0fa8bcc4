//! Registration and authentication ceremonies driven end to end against a
//! software authenticator.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ciborium::Value;
use p256::ecdsa::SigningKey;
use pretty_assertions::assert_eq;
use proptest::{prelude::*, test_runner::TestCaseError};
use sha2::{Digest, Sha256};
use sigil::{
    AssertionResponse, AttestationResponse, AttestationType, AuthenticationOptions,
    AuthenticatorAssertionResponse, AuthenticatorAttestationResponse, CeremonyContext, Challenge,
    CreationOptions, CredentialId, CredentialStore, ErrorKind, InMemoryContextStore,
    InMemoryCredentialStore, Policy, RegistrationOptions, RequestOptions, RevocationFailureMode,
    Server, ServerConfig, TrustVerdict, UserEntity, UserHandle, UserVerification,
};
use sigil_attestation::{
    AttestationObject, CertificateAuthority, Certificate, LeafOptions, MetadataEntry,
    PolicyHints, StaticMetadata, StaticRevocation, TrustAnchor, credential_auth_data, der_sign,
};
use sigil_cose::{Aaguid, AuthenticatorData, Flags};
use std::sync::Arc;
use testresult::TestResult;

const RP_ID: &str = "example.com";
const ORIGIN: &str = "https://login.example.com";
const AAGUID: Aaguid = Aaguid([0x5a; 16]);

fn server(policy: Policy) -> TestResult<(Server, Arc<InMemoryCredentialStore>)> {
    let store = Arc::new(InMemoryCredentialStore::new());
    let config = ServerConfig::new(RP_ID, "Example", ORIGIN).with_policy(policy);
    Ok((Server::new(config, store.clone())?, store))
}

fn alice() -> UserEntity {
    UserEntity {
        id: UserHandle::from(&b"alice-handle"[..]),
        name: "alice@example.com".into(),
        display_name: "Alice".into(),
    }
}

fn client_data(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    format!(
        r#"{{"type":"{kind}","challenge":"{}","origin":"{origin}","crossOrigin":false}}"#,
        URL_SAFE_NO_PAD.encode(challenge)
    )
    .into_bytes()
}

/// A software authenticator holding one P-256 credential.
struct Authenticator {
    key: SigningKey,
    id: Vec<u8>,
    user: UserHandle,
    flags: Flags,
    origin: String,
}

impl Authenticator {
    fn new(secret: u8, id: &[u8]) -> TestResult<Self> {
        Ok(Self {
            key: SigningKey::from_bytes(&[secret; 32].into())?,
            id: id.to_vec(),
            user: alice().id,
            flags: Flags::USER_PRESENT,
            origin: ORIGIN.into(),
        })
    }

    fn auth_data(&self, rp_id: &str) -> TestResult<AuthenticatorData> {
        let data = credential_auth_data(rp_id, &self.key, AAGUID, &self.id)?;
        Ok(AuthenticatorData::new(
            *data.rp_id_hash(),
            self.flags,
            0,
            data.attested_credential_data().cloned(),
            None,
        )?)
    }

    fn attestation(&self, client_data_json: Vec<u8>, object: &AttestationObject) -> TestResult<AttestationResponse> {
        Ok(AttestationResponse::new(
            CredentialId::from(self.id.clone()),
            AuthenticatorAttestationResponse {
                client_data_json,
                attestation_object: object.to_cbor()?,
                transports: vec!["internal".into()],
            },
        ))
    }

    /// A `none` attestation answering `options`.
    fn register(&self, options: &CreationOptions) -> TestResult<AttestationResponse> {
        self.register_with_challenge(options, options.challenge.as_bytes())
    }

    fn register_with_challenge(&self, options: &CreationOptions, challenge: &[u8]) -> TestResult<AttestationResponse> {
        let object = AttestationObject::new("none", Value::Map(vec![]), self.auth_data(&options.rp.id)?);
        self.attestation(client_data("webauthn.create", challenge, &self.origin), &object)
    }

    /// A `packed` full attestation signed by `attestation_key`.
    fn register_packed(
        &self,
        options: &CreationOptions,
        attestation_key: &SigningKey,
        x5c: &[Certificate],
    ) -> TestResult<AttestationResponse> {
        let client_data_json = client_data("webauthn.create", options.challenge.as_bytes(), &self.origin);
        let cdh: [u8; 32] = Sha256::digest(&client_data_json).into();
        let auth_data = self.auth_data(&options.rp.id)?;
        let statement = Value::Map(vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (
                Value::Text("sig".into()),
                Value::Bytes(der_sign(attestation_key, &auth_data.signed_message(&cdh))),
            ),
            (
                Value::Text("x5c".into()),
                Value::Array(x5c.iter().map(|c| Value::Bytes(c.as_der().to_vec())).collect()),
            ),
        ]);
        let object = AttestationObject::new("packed", statement, auth_data);
        self.attestation(client_data_json, &object)
    }

    /// An assertion answering `options` with signature counter `counter`.
    fn assert(&self, options: &RequestOptions, counter: u32) -> TestResult<AssertionResponse> {
        self.assert_with_challenge(options.challenge.as_bytes(), &options.rp_id, counter)
    }

    fn assert_with_challenge(&self, challenge: &[u8], rp_id: &str, counter: u32) -> TestResult<AssertionResponse> {
        let client_data_json = client_data("webauthn.get", challenge, &self.origin);
        let cdh: [u8; 32] = Sha256::digest(&client_data_json).into();
        let auth_data = AuthenticatorData::new(
            Sha256::digest(rp_id.as_bytes()).into(),
            self.flags,
            counter,
            None,
            None,
        )?;
        Ok(AssertionResponse::new(
            CredentialId::from(self.id.clone()),
            AuthenticatorAssertionResponse {
                client_data_json,
                signature: der_sign(&self.key, &auth_data.signed_message(&cdh)),
                authenticator_data: auth_data.as_bytes().to_vec(),
                user_handle: Some(self.user.clone()),
            },
        ))
    }
}

fn kind<T>(result: Result<T, sigil::Error>) -> Option<ErrorKind> {
    result.err().map(|error| error.kind())
}

#[test]
fn alice_registers_authenticates_and_replay_is_caught() -> TestResult {
    let (server, store) = server(Policy::default())?;
    let authenticator = Authenticator::new(7, b"alice-credential")?;

    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    assert_eq!(request.client_options.rp.id, RP_ID);
    assert!(request.client_options.exclude_credentials.is_empty());
    let response = authenticator.register(&request.client_options)?;
    let credential = server.finish_registration(&response, request.context)?;
    assert_eq!(credential.sign_count, 0);
    assert_eq!(credential.attestation_type, AttestationType::None);
    assert_eq!(credential.user_handle, alice().id);
    assert_eq!(credential.transports, vec!["internal".to_string()]);

    let request = server.start_authentication(AuthenticationOptions::for_user(alice().id))?;
    assert_eq!(
        request.client_options.allow_credentials[0].id,
        CredentialId::from(&b"alice-credential"[..])
    );
    let assertion = authenticator.assert(&request.client_options, 1)?;
    let updated = server.finish_authentication(&assertion, request.context.clone())?;
    assert_eq!(updated.sign_count, 1);
    let stored = store.get(&updated.id)?.ok_or("credential missing")?;
    assert_eq!(stored.sign_count, 1);

    assert_eq!(
        kind(server.finish_authentication(&assertion, request.context)),
        Some(ErrorKind::CounterRegression)
    );
    Ok(())
}

#[test]
fn existing_credentials_are_excluded() -> TestResult {
    let (server, _) = server(Policy::default())?;
    let authenticator = Authenticator::new(7, b"alice-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;

    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    assert_eq!(request.client_options.exclude_credentials.len(), 1);
    assert_eq!(
        kind(server.finish_registration(&authenticator.register(&request.client_options)?, request.context)),
        Some(ErrorKind::CredentialAlreadyRegistered)
    );
    Ok(())
}

#[test]
fn failed_registration_stores_nothing() -> TestResult {
    let (server, store) = server(Policy::default())?;
    let mut authenticator = Authenticator::new(7, b"alice-credential")?;

    authenticator.origin = "https://evil.example".into();
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register(&request.client_options)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::OriginMismatch)
    );

    authenticator.origin = ORIGIN.into();
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let mut options = request.client_options.clone();
    options.rp.id = "other.com".into();
    let response = authenticator.register(&options)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::RpIdMismatch)
    );

    assert!(store.is_empty());
    Ok(())
}

#[test]
fn assertion_client_data_cannot_finish_registration() -> TestResult {
    let (server, store) = server(Policy::default())?;
    let authenticator = Authenticator::new(7, b"alice-credential")?;

    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let options = &request.client_options;
    let object = AttestationObject::new("none", Value::Map(vec![]), authenticator.auth_data(&options.rp.id)?);
    let client_data_json = client_data("webauthn.get", options.challenge.as_bytes(), ORIGIN);
    let response = authenticator.attestation(client_data_json, &object)?;

    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::MalformedInput)
    );
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn cross_origin_ceremonies_need_permission() -> TestResult {
    let cross_origin = |challenge: &[u8]| {
        format!(
            r#"{{"type":"webauthn.create","challenge":"{}","origin":"{ORIGIN}","crossOrigin":true,"topOrigin":"https://embedder.example"}}"#,
            URL_SAFE_NO_PAD.encode(challenge)
        )
        .into_bytes()
    };
    let authenticator = Authenticator::new(7, b"alice-credential")?;

    let (strict, store) = server(Policy::default())?;
    let request = strict.start_registration(RegistrationOptions::new(alice()))?;
    let options = &request.client_options;
    let object = AttestationObject::new("none", Value::Map(vec![]), authenticator.auth_data(&options.rp.id)?);
    let response = authenticator.attestation(cross_origin(options.challenge.as_bytes()), &object)?;
    assert_eq!(
        kind(strict.finish_registration(&response, request.context)),
        Some(ErrorKind::OriginMismatch)
    );
    assert!(store.is_empty());

    let (lenient, store) = server(Policy {
        allow_cross_origin: true,
        ..Policy::default()
    })?;
    let request = lenient.start_registration(RegistrationOptions::new(alice()))?;
    let options = &request.client_options;
    let object = AttestationObject::new("none", Value::Map(vec![]), authenticator.auth_data(&options.rp.id)?);
    let response = authenticator.attestation(cross_origin(options.challenge.as_bytes()), &object)?;
    lenient.finish_registration(&response, request.context)?;
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn user_verification_requirement_is_enforced() -> TestResult {
    let (server, store) = server(Policy {
        user_verification: UserVerification::Required,
        ..Policy::default()
    })?;
    let mut authenticator = Authenticator::new(7, b"alice-credential")?;

    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register(&request.client_options)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::PolicyViolation)
    );

    authenticator.flags = Flags::USER_PRESENT | Flags::USER_VERIFIED;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let credential = server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;
    assert!(credential.user_verified);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn authenticators_without_a_counter_are_accepted() -> TestResult {
    let (server, store) = server(Policy::default())?;
    let authenticator = Authenticator::new(9, b"counterless")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;

    for _ in 0..2 {
        let request = server.start_authentication(AuthenticationOptions::for_user(alice().id))?;
        let credential = server.finish_authentication(&authenticator.assert(&request.client_options, 0)?, request.context)?;
        assert_eq!(credential.sign_count, 0);
    }
    let stored = store.get(&CredentialId::from(&b"counterless"[..]))?.ok_or("credential missing")?;
    assert_eq!(stored.sign_count, 0);
    Ok(())
}

#[test]
fn discoverable_authentication_checks_the_returned_user() -> TestResult {
    let (server, _) = server(Policy::default())?;
    let mut authenticator = Authenticator::new(7, b"alice-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;

    let request = server.start_authentication(AuthenticationOptions::discoverable())?;
    assert!(request.client_options.allow_credentials.is_empty());
    let credential = server.finish_authentication(&authenticator.assert(&request.client_options, 3)?, request.context)?;
    assert_eq!(credential.user_handle, alice().id);

    authenticator.user = UserHandle::from(&b"mallory"[..]);
    let request = server.start_authentication(AuthenticationOptions::discoverable())?;
    assert_eq!(
        kind(server.finish_authentication(&authenticator.assert(&request.client_options, 4)?, request.context)),
        Some(ErrorKind::CredentialNotFound)
    );
    Ok(())
}

#[test]
fn unknown_credentials_are_not_found() -> TestResult {
    let (server, _) = server(Policy::default())?;
    assert_eq!(
        kind(server.start_authentication(AuthenticationOptions::for_user(alice().id))),
        Some(ErrorKind::CredentialNotFound)
    );

    let stranger = Authenticator::new(3, b"never-registered")?;
    let request = server.start_authentication(AuthenticationOptions::discoverable())?;
    assert_eq!(
        kind(server.finish_authentication(&stranger.assert(&request.client_options, 1)?, request.context)),
        Some(ErrorKind::CredentialNotFound)
    );
    Ok(())
}

#[test]
fn assertion_signed_by_another_key_is_rejected() -> TestResult {
    let (server, store) = server(Policy::default())?;
    let authenticator = Authenticator::new(7, b"alice-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;

    let impostor = Authenticator::new(8, b"alice-credential")?;
    let request = server.start_authentication(AuthenticationOptions::for_user(alice().id))?;
    assert_eq!(
        kind(server.finish_authentication(&impostor.assert(&request.client_options, 5)?, request.context)),
        Some(ErrorKind::SignatureInvalid)
    );
    let stored = store.get(&CredentialId::from(&b"alice-credential"[..]))?.ok_or("credential missing")?;
    assert_eq!(stored.sign_count, 0);
    Ok(())
}

#[test]
fn stored_contexts_are_consumed_once() -> TestResult {
    let (server, _) = server(Policy::default())?;
    let server = server.with_context_stores(
        Arc::new(InMemoryContextStore::default()),
        Arc::new(InMemoryContextStore::default()),
    );
    let authenticator = Authenticator::new(7, b"alice-credential")?;

    let options = server.start_registration_stored(RegistrationOptions::new(alice()))?;
    let response = authenticator.register(&options)?;
    server.finish_registration_stored(&response)?;
    assert_eq!(
        kind(server.finish_registration_stored(&response)),
        Some(ErrorKind::ChallengeMismatch)
    );

    let options = server.start_authentication_stored(AuthenticationOptions::for_user(alice().id))?;
    let assertion = authenticator.assert(&options, 1)?;
    assert_eq!(server.finish_authentication_stored(&assertion)?.sign_count, 1);
    assert_eq!(
        kind(server.finish_authentication_stored(&assertion)),
        Some(ErrorKind::ChallengeMismatch)
    );
    Ok(())
}

#[test]
fn stored_operations_need_stores() -> TestResult {
    let (server, _) = server(Policy::default())?;
    assert_eq!(
        kind(server.start_registration_stored(RegistrationOptions::new(alice()))),
        Some(ErrorKind::ConfigurationError)
    );
    Ok(())
}

struct Vendor {
    root: CertificateAuthority,
    chain: Vec<Certificate>,
    attestation_key: SigningKey,
}

fn vendor() -> TestResult<Vendor> {
    let root = CertificateAuthority::root("Vendor Root", [1; 32])?;
    let intermediate = root.issue_intermediate("Vendor Batch CA", [2; 32])?;
    let (leaf, attestation_key) = intermediate.issue_leaf(
        "Vendor Authenticator",
        [3; 32],
        LeafOptions {
            aaguid: Some(AAGUID),
            crl_url: Some("http://crl.vendor.example/batch.crl".into()),
            ..LeafOptions::default()
        },
    )?;
    let chain = vec![leaf, intermediate.certificate().clone()];
    Ok(Vendor {
        root,
        chain,
        attestation_key,
    })
}

fn metadata(vendor: &Vendor) -> Arc<StaticMetadata> {
    Arc::new(StaticMetadata::new().with_aaguid(
        AAGUID,
        MetadataEntry {
            description: "Vendor Authenticator".into(),
            anchors: vec![TrustAnchor::new(vendor.root.certificate().clone())],
            hints: PolicyHints::default(),
        },
    ))
}

#[test]
fn packed_attestation_is_anchored_through_metadata() -> TestResult {
    let vendor = vendor()?;
    let (server, _) = server(Policy {
        minimum_attestation: AttestationType::Basic,
        trust_without_metadata: false,
        ..Policy::default()
    })?;
    let server = server.with_metadata(metadata(&vendor));
    let authenticator = Authenticator::new(7, b"vendor-credential")?;

    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register_packed(&request.client_options, &vendor.attestation_key, &vendor.chain)?;
    let credential = server.finish_registration(&response, request.context)?;
    assert_eq!(credential.attestation_type, AttestationType::Basic);
    assert_eq!(credential.trust_verdict, TrustVerdict::Anchored);
    assert_eq!(credential.aaguid, AAGUID);

    let request = server.start_registration(RegistrationOptions::new(UserEntity {
        id: UserHandle::from(&b"bob"[..]),
        name: "bob".into(),
        display_name: "Bob".into(),
    }))?;
    let response = Authenticator::new(8, b"bob-credential")?.register(&request.client_options)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::PolicyViolation)
    );
    Ok(())
}

#[test]
fn unknown_authenticators_need_metadata_when_required() -> TestResult {
    let vendor = vendor()?;
    let (server, _) = server(Policy {
        trust_without_metadata: false,
        ..Policy::default()
    })?;
    let authenticator = Authenticator::new(7, b"vendor-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register_packed(&request.client_options, &vendor.attestation_key, &vendor.chain)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::MetadataNotFound)
    );
    Ok(())
}

fn register_with_unreachable_crl(failure: RevocationFailureMode) -> TestResult<Result<sigil::Credential, sigil::Error>> {
    let vendor = vendor()?;
    let checker = Arc::new(StaticRevocation::unreachable());
    let (server, _) = server(Policy {
        check_revocation: true,
        revocation_failure: failure,
        ..Policy::default()
    })?;
    let server = server.with_metadata(metadata(&vendor)).with_revocation(checker.clone());

    let authenticator = Authenticator::new(7, b"vendor-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register_packed(&request.client_options, &vendor.attestation_key, &vendor.chain)?;
    let result = server.finish_registration(&response, request.context);
    assert!(checker.seen().contains(&"http://crl.vendor.example/batch.crl".to_string()));
    Ok(result)
}

#[test]
fn unreachable_revocation_fails_closed() -> TestResult {
    assert_eq!(
        kind(register_with_unreachable_crl(RevocationFailureMode::FailClosed)?),
        Some(ErrorKind::RevocationCheckUnavailable)
    );
    Ok(())
}

#[test]
fn unreachable_revocation_can_fail_open() -> TestResult {
    let credential = register_with_unreachable_crl(RevocationFailureMode::FailOpen)??;
    assert_eq!(credential.attestation_type, AttestationType::Basic);
    Ok(())
}

#[test]
fn revoked_attestation_certificate_is_rejected() -> TestResult {
    let vendor = vendor()?;
    let (server, store) = server(Policy {
        check_revocation: true,
        ..Policy::default()
    })?;
    let server = server
        .with_metadata(metadata(&vendor))
        .with_revocation(Arc::new(StaticRevocation::revoking([vendor.chain[0].fingerprint()])));

    let authenticator = Authenticator::new(7, b"vendor-credential")?;
    let request = server.start_registration(RegistrationOptions::new(alice()))?;
    let response = authenticator.register_packed(&request.client_options, &vendor.attestation_key, &vendor.chain)?;
    assert_eq!(
        kind(server.finish_registration(&response, request.context)),
        Some(ErrorKind::ChainValidationFailed)
    );
    assert!(store.is_empty());
    Ok(())
}

fn flipped(challenge: &Challenge, index: usize, mask: u8) -> Vec<u8> {
    let mut bytes = challenge.as_bytes().to_vec();
    let len = bytes.len();
    bytes[index % len] ^= mask;
    bytes
}

fn failure(result: TestResult<Option<ErrorKind>>) -> Result<Option<ErrorKind>, TestCaseError> {
    result.map_err(|e| TestCaseError::fail(format!("{e:?}")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn registration_is_bound_to_its_challenge(index in 0usize..32, mask in 1u8..=255) {
        let outcome = failure((|| -> TestResult<Option<ErrorKind>> {
            let (server, store) = server(Policy::default())?;
            let authenticator = Authenticator::new(7, b"alice-credential")?;
            let request = server.start_registration(RegistrationOptions::new(alice()))?;
            let challenge = flipped(request.context.challenge(), index, mask);
            let response = authenticator.register_with_challenge(&request.client_options, &challenge)?;
            let outcome = kind(server.finish_registration(&response, request.context));
            assert!(store.is_empty());
            Ok(outcome)
        })())?;
        prop_assert_eq!(outcome, Some(ErrorKind::ChallengeMismatch));
    }

    #[test]
    fn authentication_is_bound_to_its_challenge(index in 0usize..32, mask in 1u8..=255) {
        let outcome = failure((|| -> TestResult<Option<ErrorKind>> {
            let (server, _) = server(Policy::default())?;
            let authenticator = Authenticator::new(7, b"alice-credential")?;
            let request = server.start_registration(RegistrationOptions::new(alice()))?;
            server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;

            let request = server.start_authentication(AuthenticationOptions::for_user(alice().id))?;
            let challenge = flipped(request.context.challenge(), index, mask);
            let assertion = authenticator.assert_with_challenge(&challenge, RP_ID, 1)?;
            Ok(kind(server.finish_authentication(&assertion, request.context)))
        })())?;
        prop_assert_eq!(outcome, Some(ErrorKind::ChallengeMismatch));
    }

    #[test]
    fn stored_counter_only_moves_forward(stored in 0u32..1000, presented in 0u32..1000) {
        let outcome = failure((|| -> TestResult<Option<ErrorKind>> {
            let (server, store) = server(Policy::default())?;
            let authenticator = Authenticator::new(7, b"alice-credential")?;
            let request = server.start_registration(RegistrationOptions::new(alice()))?;
            server.finish_registration(&authenticator.register(&request.client_options)?, request.context)?;
            let id = CredentialId::from(&b"alice-credential"[..]);
            if stored > 0 {
                store.compare_and_swap_counter(&id, 0, stored, Default::default())?;
            }

            let request = server.start_authentication(AuthenticationOptions::for_user(alice().id))?;
            let result = server.finish_authentication(&authenticator.assert(&request.client_options, presented)?, request.context);
            let now = store.get(&id)?.ok_or("credential missing")?.sign_count;
            let expected_now = if result.is_ok() { presented } else { stored };
            assert_eq!(now, expected_now);
            Ok(kind(result))
        })())?;
        let accepted = presented > stored || (stored == 0 && presented == 0);
        prop_assert_eq!(outcome, if accepted { None } else { Some(ErrorKind::CounterRegression) });
    }
}
