use thiserror::Error;

use crate::object::ProxyId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("unknown proxy object {0}")]
    UnknownObject(ProxyId),

    #[error("proxy object {0} released more times than retained")]
    CountUnderflow(ProxyId),

    #[error("proxy object {0} forwards to itself")]
    ForwardingCycle(ProxyId),

    #[error("proxy object {0} is not a {1}")]
    WrongKind(ProxyId, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_name_the_object() {
        assert_eq!(
            ProxyError::CountUnderflow(ProxyId(3)).to_string(),
            "proxy object proxy#3 released more times than retained"
        );
        assert_eq!(
            ProxyError::WrongKind(ProxyId(9), "texture").to_string(),
            "proxy object proxy#9 is not a texture"
        );
    }
}
