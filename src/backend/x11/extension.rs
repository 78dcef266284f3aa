use tracing::{info, warn};
use x11rb::connection::RequestConnection;

use super::X11Error;

/// The extension macro.
///
/// This macro generates a struct which probes for the presence of some optional X11 extensions and
/// stores the version supplied by the X server. An absent or too old extension is recorded as
/// `None`; only transport failures abort the probe.
///
/// ```rust,ignore
/// extensions! {
///     // The extension to check for. This should correspond to the name of the extension inside x11rb's `x11rb::protocol::<name>` module path.
///     xfixes {
///         // The request used to query the available version, with its arguments.
///         xfixes_query_version(4, 0),
///         // The fields of the reply holding the version.
///         version: (major_version, minor_version),
///         // The minimum version of the extension that will be accepted.
///         minimum: (4, 0),
///     },
/// }
///
/// // The extensions may be checked then using the generated `Extensions` struct using the `check_extensions` function.
/// ```
macro_rules! extensions {
    (
        $(
            $extension:ident { // Extension name for path lookup
                $extension_fn:ident($($arg:expr),*), // Request used to look up the version of the extension
                version: ($major_field:ident, $minor_field:ident),
                minimum: ($min_major:expr, $min_minor:expr),
            },
        )*
    ) => {
        /// Versions of the optional extensions the X server provides.
        ///
        /// Every feature depending on an extension checks the corresponding field first.
        #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
        pub struct Extensions {
            $(
                #[doc = concat!(" The version of the `", stringify!($extension), "` extension, if available.")]
                pub $extension: Option<(u32, u32)>,
            )*
        }

        impl Extensions {
            pub(crate) fn check_extensions<C: RequestConnection>(connection: &C) -> Result<Extensions, X11Error> {
                $(
                    let $extension = {
                        use x11rb::protocol::$extension::{ConnectionExt as _, X11_EXTENSION_NAME};

                        if connection.extension_information(X11_EXTENSION_NAME)?.is_some() {
                            let reply = connection.$extension_fn($($arg),*)?.reply()?;
                            let version = (u32::from(reply.$major_field), u32::from(reply.$minor_field));

                            if version_at_least(version, ($min_major, $min_minor)) {
                                info!(
                                    "Loaded extension {} version {}.{}",
                                    X11_EXTENSION_NAME,
                                    version.0,
                                    version.1,
                                );

                                Some(version)
                            } else {
                                warn!(
                                    "{} extension version is too low (have {}.{}, expected {}.{})",
                                    X11_EXTENSION_NAME,
                                    version.0,
                                    version.1,
                                    $min_major,
                                    $min_minor,
                                );

                                None
                            }
                        } else {
                            info!("{} extension not found", X11_EXTENSION_NAME);
                            None
                        }
                    };
                )*

                Ok(Extensions {
                    $(
                        $extension,
                    )*
                })
            }
        }
    };
}

fn version_at_least(available: (u32, u32), required: (u32, u32)) -> bool {
    available.0 > required.0 || (available.0 == required.0 && available.1 >= required.1)
}

extensions! {
    randr {
        randr_query_version(1, 3),
        version: (major_version, minor_version),
        minimum: (1, 3),
    },

    xkb {
        xkb_use_extension(1, 0),
        version: (server_major, server_minor),
        minimum: (1, 0),
    },

    xinput {
        xinput_xi_query_version(2, 0),
        version: (major_version, minor_version),
        minimum: (2, 0),
    },

    xinerama {
        xinerama_query_version(1, 1),
        version: (major, minor),
        minimum: (1, 1),
    },

    render {
        render_query_version(0, 11),
        version: (major_version, minor_version),
        minimum: (0, 5),
    },

    shape {
        shape_query_version(),
        version: (major_version, minor_version),
        minimum: (1, 1),
    },

    xfixes {
        xfixes_query_version(4, 0),
        version: (major_version, minor_version),
        minimum: (4, 0),
    },
}

impl Extensions {
    /// Whether the server can deliver raw (unaccelerated) pointer motion.
    pub fn raw_input(&self) -> bool {
        self.xinput.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::version_at_least;

    #[test]
    fn version_comparison() {
        assert!(version_at_least((1, 3), (1, 3)));
        assert!(version_at_least((1, 6), (1, 3)));
        assert!(version_at_least((2, 0), (1, 3)));
        assert!(!version_at_least((1, 2), (1, 3)));
        assert!(!version_at_least((0, 11), (1, 0)));
    }
}
