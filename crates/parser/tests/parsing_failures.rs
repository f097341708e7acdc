mod parser {
    use sprig_parser::{ErrorKind, Parser, Position, Span, SyntaxError};

    fn check_parsing_fails(source: &str) -> sprig_parser::Error {
        match Parser::parse(source) {
            Ok(unit) => panic!("Unexpected success while parsing:\n{source}\n{unit:#?}"),
            Err(error) => error,
        }
    }

    mod should_fail {
        use super::*;

        #[test]
        fn missing_term_in_arithmetic() {
            let error = check_parsing_fails("1 + * 2");
            assert!(!error.is_incomplete_input());
        }

        #[test]
        fn missing_semicolon_between_items() {
            let error = check_parsing_fails("int x = 1\nint y = 2;");
            assert_eq!(
                error.span,
                Span {
                    start: Position { line: 1, column: 0 },
                    end: Position { line: 1, column: 3 },
                }
            );
        }

        #[test]
        fn missing_semicolon_in_block() {
            check_parsing_fails("function f() { return 1 }");
        }

        #[test]
        fn import_in_function_body() {
            check_parsing_fails("function f() { import sprig/io; }");
        }

        #[test]
        fn nested_function() {
            check_parsing_fails("function f() { function g() {} }");
        }

        #[test]
        fn assignment_to_call() {
            check_parsing_fails("f() = 1;");
        }

        #[test]
        fn assignment_to_qualified_name() {
            check_parsing_fails("io:x = 1;");
        }

        #[test]
        fn unterminated_string() {
            let error = check_parsing_fails("string s = \"abc");
            assert!(!error.is_incomplete_input());
        }

        #[test]
        fn integer_out_of_range() {
            check_parsing_fails("99999999999999999999");
        }

        #[test]
        fn import_without_module_name() {
            check_parsing_fails("import sprig;");
        }

        #[test]
        fn deeply_nested_expression() {
            let source = format!("{}1{}", "(".repeat(2_000), ")".repeat(2_000));
            let error = check_parsing_fails(&source);
            assert!(matches!(
                error.error,
                ErrorKind::SyntaxError(SyntaxError::NestingTooDeep)
            ));
            assert!(!error.is_incomplete_input());
        }

        #[test]
        fn deeply_nested_unary_operators() {
            let source = format!("{}1", "-".repeat(2_000));
            let error = check_parsing_fails(&source);
            assert!(matches!(
                error.error,
                ErrorKind::SyntaxError(SyntaxError::NestingTooDeep)
            ));
        }

        #[test]
        fn deeply_nested_blocks() {
            let source = format!("{}{}", "while true { ".repeat(500), "}".repeat(500));
            let error = check_parsing_fails(&source);
            assert!(matches!(
                error.error,
                ErrorKind::SyntaxError(SyntaxError::NestingTooDeep)
            ));
        }

        #[test]
        fn unclosed_deep_nesting_is_not_incomplete() {
            let error = check_parsing_fails(&"[".repeat(1_000));
            assert!(!error.is_incomplete_input());
        }
    }

    mod incomplete_input {
        use super::*;

        #[test]
        fn unclosed_function_body() {
            let error = check_parsing_fails("function f() {\n    int x = 1;");
            assert!(error.is_incomplete_input());
        }

        #[test]
        fn trailing_binary_operator() {
            assert!(check_parsing_fails("1 +").is_incomplete_input());
        }

        #[test]
        fn unclosed_call() {
            assert!(check_parsing_fails("io:println(1,").is_incomplete_input());
        }

        #[test]
        fn declaration_without_initializer() {
            assert!(check_parsing_fails("int x =").is_incomplete_input());
        }

        #[test]
        fn statement_in_unclosed_block() {
            assert!(check_parsing_fails("while true {\n  x = 1").is_incomplete_input());
        }
    }
}
