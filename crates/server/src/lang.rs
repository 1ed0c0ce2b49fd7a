//! Locale detection and the message catalog.
//!
//! Every user-facing message is addressed by a key (`validation.required`,
//! `passwords.sent`, ...). The catalog only knows the locales shipped here;
//! unknown keys fall back to English and then to the key itself.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::ACCEPT_LANGUAGE, request::Parts},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

pub const FALLBACK_LOCALE: &str = "en";

/// Locale selected for the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locale(pub String);

impl Default for Locale {
    fn default() -> Self {
        Locale(FALLBACK_LOCALE.to_string())
    }
}

impl Locale {
    /// Pick the best supported locale for an `Accept-Language` header.
    ///
    /// Falls back to the first supported locale when nothing matches.
    pub fn negotiate(header: Option<&str>, supported: &[String]) -> Locale {
        let default = supported
            .first()
            .cloned()
            .unwrap_or_else(|| FALLBACK_LOCALE.to_string());

        let Some(header) = header else {
            return Locale(default);
        };

        let mut ranges: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.trim().split(';');
                let tag = pieces.next()?.trim().to_ascii_lowercase();
                if tag.is_empty() {
                    return None;
                }
                let q = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                Some((tag, q))
            })
            .filter(|(_, q)| *q > 0.0)
            .collect();
        // stable: equal weights keep header order
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (tag, _) in &ranges {
            if tag == "*" {
                return Locale(default);
            }
            if let Some(found) = supported.iter().find(|s| s.eq_ignore_ascii_case(tag)) {
                return Locale(found.clone());
            }
            let primary = tag.split(['-', '_']).next().unwrap_or(tag);
            if let Some(found) = supported.iter().find(|s| s.eq_ignore_ascii_case(primary)) {
                return Locale(found.clone());
            }
        }

        Locale(default)
    }

    pub fn trans(&self, key: &str) -> String {
        trans(self, key, &[])
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Locale>().cloned().unwrap_or_default())
    }
}

/// Middleware storing the negotiated [`Locale`] as a request extension.
pub async fn detect_language(
    State(supported): State<Arc<Vec<String>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    let locale = Locale::negotiate(header, &supported);
    tracing::trace!(locale = %locale.0, "negotiated locale");
    request.extensions_mut().insert(locale);
    next.run(request).await
}

/// Look up `key` for `locale`, substituting `:name` placeholders.
pub fn trans(locale: &Locale, key: &str, replacements: &[(&str, &str)]) -> String {
    let template = CATALOG
        .get(&(locale.0.as_str(), key))
        .or_else(|| CATALOG.get(&(FALLBACK_LOCALE, key)))
        .copied()
        .unwrap_or(key);

    // longest placeholder first so `:min` never clobbers `:minimum`
    let mut replacements = replacements.to_vec();
    replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut message = template.to_string();
    for (name, value) in replacements {
        message = message.replace(&format!(":{name}"), value);
    }
    message
}

const EN: &[(&str, &str)] = &[
    ("errors.generic_error_message", "Whoops, something went wrong."),
    ("errors.invalid_endpoint", "Invalid endpoint."),
    ("errors.method_not_allowed", "Method not allowed for this endpoint."),
    ("errors.not_found", "The requested resource was not found."),
    ("errors.invalid_signature", "Invalid signature."),
    ("errors.forbidden", "This action is unauthorized."),
    ("auth.unauthenticated", "Unauthenticated."),
    ("auth.failed", "These credentials do not match our records."),
    (
        "auth.throttle",
        "Too many login attempts. Please try again in :seconds seconds.",
    ),
    ("auth.email.verified", "Your email address is already verified."),
    ("validation.verify_prompt", "Please, check the input data."),
    ("validation.required", "The :attribute field is required."),
    ("validation.email", "The :attribute must be a valid email address."),
    ("validation.unique", "The :attribute has already been taken."),
    ("validation.confirmed", "The :attribute confirmation does not match."),
    ("validation.min.string", "The :attribute must be at least :min characters."),
    (
        "validation.max.string",
        "The :attribute may not be greater than :max characters.",
    ),
    ("validation.invalid_body", "The request body could not be read."),
    ("passwords.sent", "We have e-mailed your password reset link!"),
    ("passwords.user", "We can't find a user with that e-mail address."),
    ("passwords.token", "This password reset token is invalid."),
    ("passwords.reset", "Your password has been reset!"),
    ("passwords.current_wrong", "The current password is wrong."),
    ("passwords.changed", "Password changed successfully."),
    ("oauth.invalid_client", "Client authentication failed"),
    ("oauth.invalid_credentials", "The user credentials were incorrect."),
    ("oauth.invalid_refresh_token", "The refresh token is invalid."),
    (
        "oauth.invalid_request",
        "The request is missing a required parameter, includes an invalid parameter value, includes a parameter more than once, or is otherwise malformed.",
    ),
    (
        "oauth.unsupported_grant_type",
        "The authorization grant type is not supported by the authorization server.",
    ),
    (
        "oauth.server_error",
        "The authorization server encountered an unexpected condition.",
    ),
    ("mail.verify.subject", "Verify Email Address"),
    (
        "mail.verify.body",
        "Please click the link below to verify your email address.\n\n:url\n\nIf you did not create an account, no further action is required.",
    ),
    ("mail.reset.subject", "Reset Password Notification"),
    (
        "mail.reset.body",
        "You are receiving this email because we received a password reset request for your account.\n\n:url\n\nIf you did not request a password reset, no further action is required.",
    ),
];

const PT: &[(&str, &str)] = &[
    ("errors.generic_error_message", "Ops, algo deu errado."),
    ("errors.invalid_endpoint", "Endpoint inválido."),
    ("errors.method_not_allowed", "Método não permitido para este endpoint."),
    ("errors.not_found", "O recurso solicitado não foi encontrado."),
    ("errors.invalid_signature", "Assinatura inválida."),
    ("errors.forbidden", "Esta ação não é autorizada."),
    ("auth.unauthenticated", "Não autenticado."),
    ("auth.failed", "Essas credenciais não correspondem aos nossos registros."),
    (
        "auth.throttle",
        "Muitas tentativas de login. Tente novamente em :seconds segundos.",
    ),
    ("auth.email.verified", "Seu endereço de e-mail já foi verificado."),
    ("validation.verify_prompt", "Por favor, verifique os dados informados."),
    ("validation.required", "O campo :attribute é obrigatório."),
    (
        "validation.email",
        "O campo :attribute deve ser um endereço de e-mail válido.",
    ),
    ("validation.unique", "O valor informado para :attribute já está em uso."),
    ("validation.confirmed", "A confirmação de :attribute não confere."),
    (
        "validation.min.string",
        "O campo :attribute deve ter pelo menos :min caracteres.",
    ),
    (
        "validation.max.string",
        "O campo :attribute não pode ter mais que :max caracteres.",
    ),
    ("validation.invalid_body", "Não foi possível ler o corpo da requisição."),
    ("passwords.sent", "Enviamos o link de redefinição de senha para o seu e-mail!"),
    ("passwords.user", "Não encontramos um usuário com esse endereço de e-mail."),
    ("passwords.token", "Este token de redefinição de senha é inválido."),
    ("passwords.reset", "Sua senha foi redefinida!"),
    ("passwords.current_wrong", "A senha atual está incorreta."),
    ("passwords.changed", "Senha alterada com sucesso."),
    ("oauth.invalid_client", "Falha na autenticação do cliente"),
    ("oauth.invalid_credentials", "As credenciais do usuário estão incorretas."),
    ("oauth.invalid_refresh_token", "O token de atualização é inválido."),
    ("oauth.invalid_request", "A requisição está incompleta ou malformada."),
    (
        "oauth.unsupported_grant_type",
        "O tipo de concessão não é suportado pelo servidor de autorização.",
    ),
    (
        "oauth.server_error",
        "O servidor de autorização encontrou uma condição inesperada.",
    ),
    ("mail.verify.subject", "Verifique seu endereço de e-mail"),
    (
        "mail.verify.body",
        "Clique no link abaixo para verificar seu endereço de e-mail.\n\n:url\n\nSe você não criou uma conta, nenhuma ação é necessária.",
    ),
    ("mail.reset.subject", "Redefinição de senha"),
    (
        "mail.reset.body",
        "Você está recebendo este e-mail porque recebemos um pedido de redefinição de senha para a sua conta.\n\n:url\n\nSe você não solicitou a redefinição, nenhuma ação é necessária.",
    ),
];

static CATALOG: Lazy<HashMap<(&'static str, &'static str), &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (locale, entries) in [("en", EN), ("pt", PT)] {
        for (key, value) in entries {
            map.insert((locale, *key), *value);
        }
    }
    map
});

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> Vec<String> {
        vec!["en".to_string(), "pt".to_string()]
    }

    #[test]
    fn negotiate_prefers_highest_quality() {
        let locale = Locale::negotiate(Some("en;q=0.5, pt-BR;q=0.9"), &supported());
        assert_eq!(locale, Locale("pt".into()));
    }

    #[test]
    fn negotiate_falls_back_to_first_supported() {
        assert_eq!(Locale::negotiate(None, &supported()), Locale("en".into()));
        assert_eq!(
            Locale::negotiate(Some("de-DE, fr;q=0.8"), &supported()),
            Locale("en".into())
        );
        assert_eq!(Locale::negotiate(Some("*"), &supported()), Locale("en".into()));
    }

    #[test]
    fn zero_quality_is_ignored() {
        let locale = Locale::negotiate(Some("pt;q=0, en;q=0.1"), &supported());
        assert_eq!(locale, Locale("en".into()));
    }

    #[test]
    fn trans_replaces_placeholders() {
        let en = Locale("en".into());
        assert_eq!(
            trans(&en, "validation.required", &[("attribute", "email")]),
            "The email field is required."
        );
        assert_eq!(
            trans(&en, "validation.min.string", &[("attribute", "password"), ("min", "8")]),
            "The password must be at least 8 characters."
        );
    }

    #[test]
    fn trans_falls_back_to_english_then_key() {
        let de = Locale("de".into());
        assert_eq!(de.trans("auth.unauthenticated"), "Unauthenticated.");
        assert_eq!(de.trans("no.such.key"), "no.such.key");
        let pt = Locale("pt".into());
        assert_eq!(pt.trans("auth.unauthenticated"), "Não autenticado.");
    }
}
