//! The ceremony orchestrator.
//!
//! ```text
//! start_registration ──► (client) ──► finish_registration ──► CredentialStore::save
//! start_authentication ─► (client) ──► finish_authentication ─► compare_and_swap_counter
//! ```
//!
//! A `finish_*` call checks the client data, then the authenticator data,
//! then the signature, and writes to the credential store only after every
//! check has passed.

use crate::{
    AssertionResponse, AttestationResponse, AuthenticationContext, AuthenticationOptions,
    AuthenticationRequest, AuthenticatorSelection, CeremonyContext, CeremonyType, Challenge,
    ClientData, ContextStore, CreationOptions, Credential, CredentialDescriptor, CredentialId,
    CredentialParameters, CredentialStore, CredentialUsage, Error, ErrorKind, ExtensionProcessor,
    NoExtensions, Origin, Policy, RegistrationContext, RegistrationOptions, RegistrationRequest,
    RelyingPartyEntity, RequestOptions, ServerConfig, StoreError, UserVerification,
    options::PUBLIC_KEY,
};
use sha2::{Digest, Sha256};
use sigil_attestation::{
    AttestationObject, ChainEvaluator, Clock, FormatRegistry, MetadataSource, RevocationChecker,
    TrustAnchorResolver, TrustVerdict, VerificationContext,
};
use sigil_cose::{AuthenticatorData, Flags, SignatureVerifier};
use std::{fmt, sync::Arc};

/// A WebAuthn relying party.
///
/// The server holds only immutable configuration and shared collaborators;
/// it is cheap to clone and safe to use from concurrent ceremonies.
#[derive(Clone)]
pub struct Server {
    rp_id: String,
    rp_name: String,
    origin: Origin,
    policy: Policy,
    credentials: Arc<dyn CredentialStore>,
    registry: FormatRegistry,
    resolver: TrustAnchorResolver,
    chains: ChainEvaluator,
    attestation_signatures: SignatureVerifier,
    assertion_signatures: SignatureVerifier,
    extensions: Arc<dyn ExtensionProcessor>,
    registrations: Option<Arc<dyn ContextStore<RegistrationContext>>>,
    authentications: Option<Arc<dyn ContextStore<AuthenticationContext>>>,
}

impl Server {
    /// A server for `config` storing credentials in `credentials`.
    ///
    /// The server starts with every attestation format, no metadata and no
    /// revocation checker.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate or none
    /// of the accepted algorithms is available.
    pub fn new(config: ServerConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, Error> {
        let origin = config.validate()?;
        let policy = config.policy;
        let assertion_signatures = SignatureVerifier::new(policy.algorithms.iter().copied());
        if assertion_signatures.algorithms().is_empty() {
            return Err(Error::configuration(
                "none of the accepted algorithms is available",
            ));
        }

        Ok(Self {
            rp_id: config.relying_party.id.trim().to_ascii_lowercase(),
            rp_name: config.relying_party.name,
            origin,
            resolver: TrustAnchorResolver::without_source(policy.trust_without_metadata),
            chains: ChainEvaluator::new().with_failure_mode(policy.revocation_failure),
            policy,
            credentials,
            registry: FormatRegistry::standard(),
            attestation_signatures: SignatureVerifier::supported(),
            assertion_signatures,
            extensions: Arc::new(NoExtensions),
            registrations: None,
            authentications: None,
        })
    }

    /// Resolve attestation trust anchors through `source`.
    #[must_use]
    pub fn with_metadata(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.resolver = TrustAnchorResolver::new(source, self.policy.trust_without_metadata);
        self
    }

    /// Check attestation certificates for revocation with `checker` when
    /// the policy enables revocation checking.
    #[must_use]
    pub fn with_revocation(mut self, checker: Arc<dyn RevocationChecker>) -> Self {
        self.chains = self
            .chains
            .with_revocation(checker, self.policy.revocation_failure);
        self
    }

    /// Check certificate validity against `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.chains = self.chains.with_clock(clock);
        self
    }

    /// Use `registry` instead of the standard attestation formats.
    #[must_use]
    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Route extension inputs and outputs through `extensions`.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionProcessor>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Keep contexts in these stores, enabling the `*_stored` operations.
    #[must_use]
    pub fn with_context_stores(
        mut self,
        registrations: Arc<dyn ContextStore<RegistrationContext>>,
        authentications: Arc<dyn ContextStore<AuthenticationContext>>,
    ) -> Self {
        self.registrations = Some(registrations);
        self.authentications = Some(authentications);
        self
    }

    /// The relying party id.
    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The normalized origin.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The policy.
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Begin registering a credential for `options.user`.
    ///
    /// The user's existing credentials are excluded so the authenticator
    /// does not create a second one.
    ///
    /// # Errors
    ///
    /// Fails when no random challenge can be generated or the credential
    /// store cannot list the user's credentials.
    #[tracing::instrument(skip_all, fields(rp_id = %self.rp_id, user = %options.user.name))]
    pub fn start_registration(&self, options: RegistrationOptions) -> Result<RegistrationRequest, Error> {
        let challenge = Challenge::random()?;
        let existing = self.credentials.credentials_for_user(&options.user.id)?;
        let user_verification = options
            .user_verification
            .unwrap_or(self.policy.user_verification);

        let client_options = CreationOptions {
            challenge: challenge.clone(),
            rp: RelyingPartyEntity {
                id: self.rp_id.clone(),
                name: self.rp_name.clone(),
            },
            user: options.user.clone(),
            pub_key_cred_params: self
                .assertion_signatures
                .algorithms()
                .iter()
                .map(|alg| CredentialParameters {
                    kind: PUBLIC_KEY.into(),
                    alg: *alg,
                })
                .collect(),
            timeout: self.policy.timeout_ms,
            exclude_credentials: existing
                .iter()
                .map(|credential| {
                    CredentialDescriptor::public_key(credential.id.clone(), credential.transports.clone())
                })
                .collect(),
            authenticator_selection: AuthenticatorSelection { user_verification },
            attestation: self.policy.attestation,
            extensions: self.extensions.inputs(CeremonyType::Create),
        };
        let context = RegistrationContext::new(
            challenge,
            self.origin.clone(),
            self.rp_id.clone(),
            options.user,
            existing.into_iter().map(|credential| credential.id).collect(),
            user_verification,
        );

        tracing::debug!(excluded = context.exclude_credentials().len(), "registration started");
        Ok(RegistrationRequest {
            client_options,
            context,
        })
    }

    /// Verify a registration response and store the new credential.
    ///
    /// # Errors
    ///
    /// Fails with the kind of the first check that does not pass; nothing
    /// is stored in that case.
    #[tracing::instrument(skip_all, fields(rp_id = %self.rp_id, credential = %response.raw_id))]
    pub fn finish_registration(
        &self,
        response: &AttestationResponse,
        context: RegistrationContext,
    ) -> Result<Credential, Error> {
        response.check()?;
        let client_data = ClientData::parse(&response.response.client_data_json)?;
        self.check_client_data(&client_data, CeremonyType::Create, &context, context.origin())?;

        let object = AttestationObject::from_cbor(&response.response.attestation_object)?;
        let auth_data = object.auth_data();
        self.check_authenticator_data(auth_data, context.rp_id(), context.user_verification())?;

        let attested = auth_data
            .attested_credential_data()
            .ok_or_else(|| Error::malformed("authenticator data carries no attested credential"))?;
        let alg = attested.public_key.algorithm();
        if !self.policy.algorithms.contains(&alg) {
            return Err(Error::new(
                ErrorKind::UnsupportedAlgorithm,
                format!("credential algorithm {alg} is not accepted"),
            ));
        }
        if attested.credential_id != response.raw_id.as_bytes() {
            return Err(Error::malformed(
                "rawId differs from the attested credential id",
            ));
        }
        let id = CredentialId::from(attested.credential_id.clone());
        if context.exclude_credentials().contains(&id) {
            return Err(Error::new(
                ErrorKind::CredentialAlreadyRegistered,
                format!("credential {id} is excluded"),
            ));
        }

        let verification = VerificationContext {
            signatures: &self.attestation_signatures,
            resolver: &self.resolver,
            chains: &self.chains,
            check_revocation: self.policy.check_revocation,
            strict: self.policy.strict_format_support,
        };
        let result = self.registry.verify(&object, client_data.hash(), &verification)?;
        if !result.attestation_type.satisfies(self.policy.minimum_attestation) {
            return Err(Error::policy(format!(
                "attestation type {} is weaker than the required {}",
                result.attestation_type, self.policy.minimum_attestation
            )));
        }
        if result.verdict == TrustVerdict::Unanchored {
            tracing::warn!(
                aaguid = %attested.aaguid,
                "attestation accepted without a trust anchor"
            );
        }

        self.process_extensions(
            CeremonyType::Create,
            &response.client_extension_results,
            auth_data,
        )?;

        let flags = auth_data.flags();
        let credential = Credential {
            id,
            user_handle: context.user().id.clone(),
            public_key: attested.public_key.clone(),
            sign_count: auth_data.sign_count(),
            aaguid: attested.aaguid,
            attestation_type: result.attestation_type,
            trust_verdict: result.verdict,
            backup_eligible: flags.backup_eligible(),
            backed_up: flags.backed_up(),
            user_verified: flags.user_verified(),
            transports: response.response.transports.clone(),
        };
        self.credentials.save(credential.clone())?;

        tracing::info!(
            format = object.format(),
            attestation_type = %credential.attestation_type,
            aaguid = %credential.aaguid,
            "credential registered"
        );
        Ok(credential)
    }

    /// Begin an authentication. Without a user handle the ceremony is
    /// discoverable and the allow list is empty.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::CredentialNotFound`] when the user has no
    /// credentials, and when no random challenge can be generated or the
    /// store cannot be read.
    #[tracing::instrument(skip_all, fields(rp_id = %self.rp_id, discoverable = options.user_handle.is_none()))]
    pub fn start_authentication(
        &self,
        options: AuthenticationOptions,
    ) -> Result<AuthenticationRequest, Error> {
        let allowed = match &options.user_handle {
            Some(user) => {
                let credentials = self.credentials.credentials_for_user(user)?;
                if credentials.is_empty() {
                    return Err(Error::new(
                        ErrorKind::CredentialNotFound,
                        format!("user {user} has no credentials"),
                    ));
                }
                credentials
            }
            None => Vec::new(),
        };
        let challenge = Challenge::random()?;
        let user_verification = options
            .user_verification
            .unwrap_or(self.policy.user_verification);

        let client_options = RequestOptions {
            challenge: challenge.clone(),
            timeout: self.policy.timeout_ms,
            rp_id: self.rp_id.clone(),
            allow_credentials: allowed
                .iter()
                .map(|credential| {
                    CredentialDescriptor::public_key(credential.id.clone(), credential.transports.clone())
                })
                .collect(),
            user_verification,
            extensions: self.extensions.inputs(CeremonyType::Get),
        };
        let context = AuthenticationContext::new(
            challenge,
            self.origin.clone(),
            self.rp_id.clone(),
            options.user_handle,
            allowed.into_iter().map(|credential| credential.id).collect(),
            user_verification,
        );

        tracing::debug!(allowed = context.allow_credentials().len(), "authentication started");
        Ok(AuthenticationRequest {
            client_options,
            context,
        })
    }

    /// Verify an assertion and advance the credential's signature counter.
    ///
    /// Returns the credential as stored after the update.
    ///
    /// # Errors
    ///
    /// Fails with the kind of the first check that does not pass; the
    /// stored credential is unchanged in that case.
    #[tracing::instrument(skip_all, fields(rp_id = %self.rp_id, credential = %response.raw_id))]
    pub fn finish_authentication(
        &self,
        response: &AssertionResponse,
        context: AuthenticationContext,
    ) -> Result<Credential, Error> {
        response.check()?;
        let client_data = ClientData::parse(&response.response.client_data_json)?;
        self.check_client_data(&client_data, CeremonyType::Get, &context, context.origin())?;

        let id = &response.raw_id;
        let not_found = || Error::new(ErrorKind::CredentialNotFound, format!("credential {id} is not registered"));
        if !context.allow_credentials().is_empty() && !context.allow_credentials().contains(id) {
            return Err(Error::new(
                ErrorKind::CredentialNotFound,
                format!("credential {id} is not allowed for this ceremony"),
            ));
        }
        let stored = self.credentials.get(id)?.ok_or_else(not_found)?;

        match (context.user_handle(), &response.response.user_handle) {
            (Some(expected), _) if expected != &stored.user_handle => {
                return Err(Error::new(
                    ErrorKind::CredentialNotFound,
                    format!("credential {id} belongs to another user"),
                ));
            }
            (_, Some(returned)) if returned != &stored.user_handle => {
                return Err(Error::new(
                    ErrorKind::CredentialNotFound,
                    format!("returned user handle does not own credential {id}"),
                ));
            }
            (None, None) => {
                return Err(Error::malformed(
                    "discoverable assertion carries no user handle",
                ));
            }
            _ => {}
        }

        let auth_data = AuthenticatorData::from_bytes(&response.response.authenticator_data)?;
        self.check_authenticator_data(&auth_data, context.rp_id(), context.user_verification())?;

        self.assertion_signatures.verify(
            &auth_data.signed_message(client_data.hash()),
            &response.response.signature,
            &stored.public_key,
        )?;
        tracing::debug!("assertion signature verified");

        let presented = auth_data.sign_count();
        check_counter(stored.sign_count, presented)?;

        self.process_extensions(
            CeremonyType::Get,
            &response.client_extension_results,
            &auth_data,
        )?;

        let flags = auth_data.flags();
        if flags.backup_eligible() != stored.backup_eligible {
            tracing::warn!(
                stored = stored.backup_eligible,
                presented = flags.backup_eligible(),
                "backup eligibility changed"
            );
        }
        let usage = CredentialUsage {
            backed_up: flags.backed_up(),
            user_verified: flags.user_verified(),
        };
        self.credentials
            .compare_and_swap_counter(id, stored.sign_count, presented, usage)
            .map_err(|error| match error {
                StoreError::CounterChanged { expected, found } => Error::new(
                    ErrorKind::CounterRegression,
                    format!("counter moved from {expected} to {found} during the ceremony"),
                ),
                other => Error::from(other),
            })?;

        tracing::info!(sign_count = presented, "assertion accepted");
        Ok(Credential {
            sign_count: presented,
            backed_up: usage.backed_up,
            user_verified: usage.user_verified,
            ..stored
        })
    }

    /// [`Server::start_registration`], keeping the context in the
    /// registration store.
    ///
    /// # Errors
    ///
    /// As [`Server::start_registration`], plus a configuration error when
    /// no context stores were configured.
    pub fn start_registration_stored(&self, options: RegistrationOptions) -> Result<CreationOptions, Error> {
        let store = stores(&self.registrations)?;
        let request = self.start_registration(options)?;
        store.put(request.context)?;
        Ok(request.client_options)
    }

    /// [`Server::finish_registration`] with the context taken from the
    /// registration store by the challenge in the client data.
    ///
    /// # Errors
    ///
    /// As [`Server::finish_registration`]; a challenge with no stored
    /// context (unknown, expired or already used) fails with
    /// [`ErrorKind::ChallengeMismatch`].
    pub fn finish_registration_stored(&self, response: &AttestationResponse) -> Result<Credential, Error> {
        let store = stores(&self.registrations)?;
        let context = take_context(&**store, &response.response.client_data_json)?;
        self.finish_registration(response, context)
    }

    /// [`Server::start_authentication`], keeping the context in the
    /// authentication store.
    ///
    /// # Errors
    ///
    /// As [`Server::start_authentication`], plus a configuration error when
    /// no context stores were configured.
    pub fn start_authentication_stored(
        &self,
        options: AuthenticationOptions,
    ) -> Result<RequestOptions, Error> {
        let store = stores(&self.authentications)?;
        let request = self.start_authentication(options)?;
        store.put(request.context)?;
        Ok(request.client_options)
    }

    /// [`Server::finish_authentication`] with the context taken from the
    /// authentication store by the challenge in the client data.
    ///
    /// # Errors
    ///
    /// As [`Server::finish_authentication`]; a challenge with no stored
    /// context fails with [`ErrorKind::ChallengeMismatch`].
    pub fn finish_authentication_stored(&self, response: &AssertionResponse) -> Result<Credential, Error> {
        let store = stores(&self.authentications)?;
        let context = take_context(&**store, &response.response.client_data_json)?;
        self.finish_authentication(response, context)
    }

    fn check_client_data(
        &self,
        client_data: &ClientData,
        ceremony: CeremonyType,
        context: &impl CeremonyContext,
        origin: &Origin,
    ) -> Result<(), Error> {
        if client_data.ceremony != ceremony {
            return Err(Error::malformed(format!(
                "client data type is {}, expected {}",
                client_data.ceremony.as_str(),
                ceremony.as_str()
            )));
        }
        if client_data.challenge != context.challenge().as_bytes() {
            return Err(Error::new(
                ErrorKind::ChallengeMismatch,
                "client data challenge differs from the ceremony challenge",
            ));
        }
        if !origin.matches(&client_data.origin) {
            return Err(Error::new(
                ErrorKind::OriginMismatch,
                format!("origin {:?} is not {origin}", client_data.origin),
            ));
        }
        if client_data.cross_origin && !self.policy.allow_cross_origin {
            return Err(Error::new(
                ErrorKind::OriginMismatch,
                format!(
                    "cross-origin ceremony from {:?} is not allowed",
                    client_data.top_origin.as_deref().unwrap_or("an unknown top origin")
                ),
            ));
        }
        tracing::debug!(ceremony = ceremony.as_str(), "client data verified");
        Ok(())
    }

    fn check_authenticator_data(
        &self,
        auth_data: &AuthenticatorData,
        rp_id: &str,
        verification: UserVerification,
    ) -> Result<(), Error> {
        let expected: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
        if auth_data.rp_id_hash() != &expected {
            return Err(Error::new(
                ErrorKind::RpIdMismatch,
                format!("authenticator data is not scoped to {rp_id}"),
            ));
        }
        let flags = auth_data.flags();
        if let Some(unmet) =
            self.policy
                .user_requirement_unmet(verification, flags.user_present(), flags.user_verified())
        {
            return Err(Error::policy(unmet));
        }
        if flags.contains(Flags::BACKED_UP) && !flags.backup_eligible() {
            return Err(Error::malformed(
                "backup state set on a credential that is not backup eligible",
            ));
        }
        Ok(())
    }

    fn process_extensions(
        &self,
        ceremony: CeremonyType,
        client_outputs: &serde_json::Map<String, serde_json::Value>,
        auth_data: &AuthenticatorData,
    ) -> Result<(), Error> {
        self.extensions
            .process(ceremony, client_outputs, auth_data.extensions())
            .map_err(|reason| Error::policy(format!("extension outputs rejected: {reason}")))
    }
}

/// Accept `presented` over `stored` if it advanced, or if both are zero
/// (an authenticator without a counter).
fn check_counter(stored: u32, presented: u32) -> Result<(), Error> {
    if presented > stored {
        return Ok(());
    }
    if stored == 0 && presented == 0 {
        tracing::warn!("authenticator does not implement a signature counter, cloning is undetectable");
        return Ok(());
    }
    Err(Error::new(
        ErrorKind::CounterRegression,
        format!("signature counter {presented} does not exceed stored {stored}"),
    ))
}

fn stores<C: CeremonyContext>(
    store: &Option<Arc<dyn ContextStore<C>>>,
) -> Result<&Arc<dyn ContextStore<C>>, Error> {
    store
        .as_ref()
        .ok_or_else(|| Error::configuration("no context store is configured"))
}

fn take_context<C: CeremonyContext>(
    store: &dyn ContextStore<C>,
    client_data_json: &[u8],
) -> Result<C, Error> {
    let client_data = ClientData::parse(client_data_json)?;
    let challenge = Challenge::from_bytes(client_data.challenge)?;
    store.take(&challenge)?.ok_or_else(|| {
        Error::new(
            ErrorKind::ChallengeMismatch,
            "no pending ceremony for this challenge",
        )
    })
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("rp_id", &self.rp_id)
            .field("origin", &self.origin)
            .field("policy", &self.policy)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
