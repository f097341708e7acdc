
use runtime_test_utils::{check_fails, evaluate};
use sprig_shell::DiagnosticKind::Semantic;
use sprig_test_utils::check_session;

mod declarations {
    use super::*;

    #[test]
    fn incompatible_initializer() {
        check_fails(
            &[],
            "int count = \"three\";",
            Semantic,
            "incompatible types: expected 'int', found 'string'",
        );
    }

    #[test]
    fn optional_into_plain_type() {
        check_fails(
            &["int? maybe = 1;"],
            "int certainly = maybe;",
            Semantic,
            "incompatible types: expected 'int', found 'int?'",
        );
    }

    #[test]
    fn reserved_name() {
        check_fails(
            &[],
            "int __hidden = 1;",
            Semantic,
            "'__hidden' is reserved, names starting with '__' can't be declared",
        );
    }

    #[test]
    fn unknown_type() {
        check_fails(&[], "Missing value = 1;", Semantic, "unknown type 'Missing'");
    }

    #[test]
    fn unknown_module() {
        check_fails(&[], "import sprig/nope;", Semantic, "unknown module 'sprig/nope'");
    }

    #[test]
    fn final_variables_cant_be_assigned() {
        check_fails(
            &["final int limit = 10;"],
            "limit = 11;",
            Semantic,
            "cannot assign to the final variable 'limit'",
        );
    }

    #[test]
    fn functions_cant_be_assigned() {
        check_fails(
            &["function f() {}"],
            "f = 1;",
            Semantic,
            "cannot assign to the function 'f'",
        );
    }

    #[test]
    fn rejected_redefinitions_keep_the_previous_definition() {
        let (mut session, _) = check_session(&[("int x = 1;", None)]);

        let result = evaluate(&mut session, "int x = \"one\";");
        assert!(!result.committed);

        let result = evaluate(&mut session, "x");
        assert_eq!(result.value.as_deref(), Some("1"));
    }
}

mod expressions {
    use super::*;

    #[test]
    fn undefined_symbol() {
        check_fails(&[], "missing + 1", Semantic, "undefined symbol 'missing'");
    }

    #[test]
    fn undefined_function() {
        check_fails(&[], "missing(1)", Semantic, "undefined function 'missing'");
    }

    #[test]
    fn variables_arent_functions() {
        check_fails(&["int x = 1;"], "x()", Semantic, "'x' is not a function");
    }

    #[test]
    fn functions_arent_values() {
        check_fails(
            &["function f() {}"],
            "var g = f;",
            Semantic,
            "the function 'f' can't be used as a value",
        );
    }

    #[test]
    fn undefined_prefix() {
        check_fails(
            &[],
            "nowhere:call()",
            Semantic,
            "undefined module prefix 'nowhere'",
        );
    }

    #[test]
    fn function_not_in_module() {
        check_fails(
            &["import sprig/math;"],
            "math:cube(2)",
            Semantic,
            "'cube' is not defined in module 'sprig/math'",
        );
    }

    #[test]
    fn wrong_argument_count() {
        check_fails(
            &["function add(int a, int b) returns int { return a + b; }"],
            "add(1)",
            Semantic,
            "'add' expects 2 arguments, but 1 were provided",
        );
    }

    #[test]
    fn wrong_variadic_argument_count() {
        check_fails(
            &["import sprig/math;"],
            "math:max()",
            Semantic,
            "'math:max' expects at least 1 arguments, but 0 were provided",
        );
    }

    #[test]
    fn wrong_argument_type() {
        check_fails(
            &["function twice(int n) returns int { return n * 2; }"],
            "twice(\"2\")",
            Semantic,
            "incompatible types: expected 'int', found 'string'",
        );
    }

    #[test]
    fn invalid_operator() {
        check_fails(
            &[],
            "1 + \"a\"",
            Semantic,
            "operator '+' is not defined for 'int' and 'string'",
        );
    }

    #[test]
    fn indexing_a_number() {
        check_fails(&[], "5[0]", Semantic, "a value of type 'int' can't be indexed");
    }

    #[test]
    fn iterating_over_a_number() {
        check_fails(
            &[],
            "foreach int i in 5 {}",
            Semantic,
            "a value of type 'int' can't be iterated over",
        );
    }
}

mod statements {
    use super::*;

    #[test]
    fn break_outside_of_a_loop() {
        check_fails(&[], "break;", Semantic, "'break' can only be used inside a loop");
    }

    #[test]
    fn continue_outside_of_a_loop() {
        check_fails(
            &[],
            "function f() { continue; }",
            Semantic,
            "'continue' can only be used inside a loop",
        );
    }

    #[test]
    fn return_type_mismatch() {
        check_fails(
            &[],
            "function name() returns string { return 42; }",
            Semantic,
            "incompatible types: expected 'string', found 'int'",
        );
    }
}
