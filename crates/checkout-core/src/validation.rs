//! Input Validation
//!
//! Checks run on customer data before a transaction is submitted.

use crate::error::{CheckoutError, Result};
use crate::model::{Address, Customer};

/// Keep only ASCII digits
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Validate a CPF (individual taxpayer id), formatted or not
pub fn is_valid_cpf(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != 11 {
        return false;
    }

    // 000.000.000-00, 111.111.111-11, ... pass the checksum but are invalid
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// Mod-11 check digit over `prefix`, weights counting down to 2
fn check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();

    match 11 - (sum % 11) {
        10 | 11 => 0,
        r => r,
    }
}

/// Format up to 11 digits as `000.000.000-00`
pub fn format_cpf(value: &str) -> String {
    let digits: String = digits_only(value).chars().take(11).collect();
    let mut out = String::with_capacity(14);

    for (i, c) in digits.chars().enumerate() {
        match i {
            3 | 6 => out.push('.'),
            9 => out.push('-'),
            _ => {}
        }
        out.push(c);
    }

    out
}

/// `local@domain.tld` with no whitespace and a single `@`
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Some dot in the domain must have text on both sides
    domain
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

/// Brazilian postal code: exactly 8 digits once formatting is stripped
pub fn normalize_cep(cep: &str) -> Option<String> {
    let digits = digits_only(cep);
    (digits.len() == 8).then_some(digits)
}

/// Validate and normalize a customer in place
///
/// Strips formatting from phone and document. Fails on the first
/// invalid field with a message suitable for the page.
pub fn validate_customer(customer: &mut Customer) -> Result<()> {
    customer.name = customer.name.trim().to_string();
    customer.email = customer.email.trim().to_string();
    customer.phone = digits_only(&customer.phone);
    customer.document = digits_only(&customer.document);

    if customer.name.is_empty() {
        return Err(CheckoutError::Validation("Nome é obrigatório".into()));
    }

    if !is_valid_email(&customer.email) {
        return Err(CheckoutError::Validation("Email inválido".into()));
    }

    if customer.phone.len() < 10 {
        return Err(CheckoutError::Validation("Telefone inválido".into()));
    }

    if !is_valid_cpf(&customer.document) {
        return Err(CheckoutError::Validation("CPF inválido".into()));
    }

    Ok(())
}

/// Validate the delivery address collected at step 2
pub fn validate_address(address: &mut Address) -> Result<()> {
    address.cep = normalize_cep(&address.cep)
        .ok_or_else(|| CheckoutError::Validation("CEP inválido".into()))?;

    if address.street.trim().is_empty() || address.number.trim().is_empty() {
        return Err(CheckoutError::Validation("Endereço incompleto".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpf_check_digits() {
        assert!(is_valid_cpf("529.982.247-25"));
        assert!(is_valid_cpf("52998224725"));
        assert!(!is_valid_cpf("529.982.247-24"));
        assert!(!is_valid_cpf("111.111.111-11"));
        assert!(!is_valid_cpf("1234567890"));
    }

    #[test]
    fn test_cpf_formatting() {
        assert_eq!(format_cpf("52998224725"), "529.982.247-25");
        assert_eq!(format_cpf("5299"), "529.9");
        assert_eq!(format_cpf("529982247251234"), "529.982.247-25");
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("ana@example.com"));
        assert!(is_valid_email("a.b@mail.co.uk"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@@example.com"));
        assert!(!is_valid_email("ana@.com"));
        assert!(!is_valid_email("ana@example."));
    }

    #[test]
    fn test_customer_is_normalized() {
        let mut customer = Customer {
            name: " Ana Souza ".into(),
            email: "ana@example.com".into(),
            phone: "(11) 98765-4321".into(),
            document: "529.982.247-25".into(),
            ..Default::default()
        };

        validate_customer(&mut customer).unwrap();
        assert_eq!(customer.name, "Ana Souza");
        assert_eq!(customer.phone, "11987654321");
        assert_eq!(customer.document, "52998224725");
    }

    #[test]
    fn test_invalid_cpf_is_rejected() {
        let mut customer = Customer {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: "11987654321".into(),
            document: "123.456.789-00".into(),
            ..Default::default()
        };

        let err = validate_customer(&mut customer).unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(msg) if msg == "CPF inválido"));
    }

    #[test]
    fn test_cep_normalization() {
        assert_eq!(normalize_cep("01310-100").as_deref(), Some("01310100"));
        assert_eq!(normalize_cep("0131010"), None);
    }
}
